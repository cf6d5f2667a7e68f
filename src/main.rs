use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use futures::future::BoxFuture;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use querygraph_core::config::AppConfig;
use querygraph_core::error::{QueryGraphError, Result};
use querygraph_core::traits::{Reasoner, ToolInvoker, ToolRegistry};
use querygraph_core::types::ToolDescriptor;

use querygraph_agent::context::{render_tool_summary, value_text};
use querygraph_agent::{AgentReport, QueryAgent};

const DEFAULT_CONFIG: &str = "querygraph.toml";

#[derive(Parser)]
#[command(name = "querygraph", version, about = "Ask questions about your database in plain language")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question by running the full agent loop
    Run {
        /// Description of the database (tables, columns, conventions)
        #[arg(short = 'd', long, default_value = "")]
        database_context: String,
        /// The question; read from stdin when omitted
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Generate SQL for a question without executing anything
    Sql {
        #[arg(short = 'd', long, default_value = "")]
        database_context: String,
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// List the tools the agent would offer the model
    Tools,
    /// Show current configuration (API keys masked)
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("querygraph=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "querygraph", &mut io::stdout());
        return Ok(());
    }

    if let Err(e) = dispatch(&cli).await {
        eprintln!("Error: {}", e);
        if e
            .downcast_ref::<QueryGraphError>()
            .is_some_and(QueryGraphError::is_config)
        {
            print_config_hint();
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            let masked = mask_keys(config);
            println!("{}", toml::to_string_pretty(&masked)?);
        }
        Commands::Tools => {
            let agent = agent_with_tools(&config)?;
            let tools = agent.discover_tools().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else {
                println!("{}", render_tool_summary(&tools));
            }
        }
        Commands::Sql {
            ref database_context,
            ref question,
        } => {
            let question = question_text(question)?;
            let agent = QueryAgent::new(
                reasoner(&config),
                Arc::new(NoTools),
                Arc::new(NoTools),
                config.agent.clone(),
            );
            let sql = agent.generate_sql(&question, database_context).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "thinking": sql.reasoning,
                        "sql_query": sql.sql_query,
                        "explanation": sql.explanation,
                    })
                );
            } else {
                println!("{}", sql.sql_query);
                if !sql.explanation.is_empty() {
                    eprintln!("\n{}", sql.explanation);
                }
            }
        }
        Commands::Run {
            ref database_context,
            ref question,
        } => {
            let question = question_text(question)?;
            let agent = agent_with_tools(&config)?;

            let cancel = agent.run_token();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Cancelling run...");
                on_interrupt.cancel();
            });

            let report = agent.run_until(&question, database_context, cancel).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if report.is_config_failure() {
                print_config_hint();
            }
            if report.is_failed() {
                std::process::exit(1);
            }
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}

fn print_config_hint() {
    eprintln!(
        "Hint: create {} or set GEMINI_API_KEY / OPENAI_API_KEY, and point mcp_config at your MCP server file.",
        DEFAULT_CONFIG
    );
}

/// Load the TOML config, falling back to environment keys when the default
/// config file is absent.
fn load_config(path: &Path) -> Result<AppConfig> {
    match AppConfig::load(path) {
        Err(QueryGraphError::ConfigNotFound(_)) if path == Path::new(DEFAULT_CONFIG) => {
            warn!(path = %path.display(), "Config file not found, using environment");
            AppConfig::from_env()
        }
        other => other,
    }
}

fn reasoner(config: &AppConfig) -> Arc<dyn Reasoner> {
    Arc::from(querygraph_llm::create_reasoner_chain(
        &config.model,
        &config.fallback_models,
    ))
}

fn agent_with_tools(config: &AppConfig) -> Result<QueryAgent> {
    let source = Arc::new(querygraph_mcp::tool_source_from_config(config)?);
    info!(server = %source.server_name(), "Using MCP tool server");
    Ok(QueryAgent::new(
        reasoner(config),
        source.clone(),
        source,
        config.agent.clone(),
    ))
}

fn question_text(words: &[String]) -> anyhow::Result<String> {
    let text = if words.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .map_while(|l| l.ok())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        words.join(" ")
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        anyhow::bail!("no question given");
    }
    Ok(text)
}

fn mask(key: &mut Option<String>) {
    if let Some(k) = key.as_mut() {
        let shown: String = k.chars().take(4).collect();
        *k = format!("{}****", shown);
    }
}

fn mask_keys(mut config: AppConfig) -> AppConfig {
    mask(&mut config.model.api_key);
    for model in &mut config.fallback_models {
        mask(&mut model.api_key);
    }
    config
}

fn print_report(report: &AgentReport) {
    match report {
        AgentReport::Completed {
            run_id,
            question,
            query_used,
            query_result,
            query_explanation,
            is_data_correct,
            outcome,
            steps,
            ..
        } => {
            println!("Question: {}", question);
            if let Some(sql) = query_used.as_deref().filter(|s| !s.is_empty()) {
                println!("\nSQL:\n{}", sql);
            }
            if let Some(explanation) = query_explanation.as_deref().filter(|s| !s.is_empty()) {
                println!("\nExplanation:\n{}", explanation);
            }
            if let Some(result) = query_result {
                println!("\nResult:\n{}", value_text(result));
            }
            let verdict = match is_data_correct {
                Some(true) => "validated",
                Some(false) => "not validated",
                None => "not checked",
            };
            println!(
                "\n[{}] {:?} after {} steps, result {}",
                run_id,
                outcome,
                steps.len(),
                verdict
            );
        }
        AgentReport::Failed {
            run_id, error, ..
        } => {
            eprintln!("[{}] Run failed: {}", run_id, error);
        }
    }
}

/// Stand-in tool source for commands that never touch the database.
struct NoTools;

impl ToolRegistry for NoTools {
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDescriptor>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

impl ToolInvoker for NoTools {
    fn call(
        &self,
        name: &str,
        _arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let tool = name.to_string();
        Box::pin(async move {
            Err(QueryGraphError::ToolExecution {
                tool,
                message: "no tool server configured".into(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_prefix() {
        let mut key = Some("AIzaSyExample".to_string());
        mask(&mut key);
        assert_eq!(key.as_deref(), Some("AIza****"));

        let mut none = None;
        mask(&mut none);
        assert!(none.is_none());
    }

    #[test]
    fn test_question_from_words() {
        let words = vec!["How".to_string(), "many".to_string(), "users?".to_string()];
        assert_eq!(question_text(&words).unwrap(), "How many users?");
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["querygraph", "--json", "run", "-d", "users(id)", "How", "many?"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                database_context,
                question,
            } => {
                assert_eq!(database_context, "users(id)");
                assert_eq!(question, vec!["How", "many?"]);
            }
            _ => panic!("expected run"),
        }
    }
}
