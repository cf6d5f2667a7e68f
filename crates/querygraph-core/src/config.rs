use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueryGraphError, Result};

/// Top-level querygraph configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to an `mcpServers` JSON file. Relative paths resolve against the
    /// directory of the TOML file.
    #[serde(default)]
    pub mcp_config: Option<String>,
    #[serde(default)]
    pub agent: AgentConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub mcp: Option<McpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on node steps per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Wall-clock cap per run in seconds (0 = unlimited).
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    /// Stop the refinement loop once validation reports correct data.
    #[serde(default = "default_stop_on_validated")]
    pub stop_on_validated: bool,
    /// SQL dialect the generator is asked to target.
    #[serde(default = "default_sql_dialect")]
    pub sql_dialect: String,
    /// Name of the MCP server that provides database tools.
    #[serde(default = "default_tool_server")]
    pub tool_server: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_duration_secs: default_max_duration(),
            stop_on_validated: default_stop_on_validated(),
            sql_dialect: default_sql_dialect(),
            tool_server: default_tool_server(),
        }
    }
}

fn default_max_steps() -> usize { 25 }
fn default_max_duration() -> u64 { 600 }
fn default_stop_on_validated() -> bool { true }
fn default_sql_dialect() -> String { "PostgreSQL".to_string() }
fn default_tool_server() -> String { "supabase".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "gemini".to_string() }
fn default_max_tokens() -> u32 { 8192 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// MCP (Model Context Protocol) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub transport: McpTransport,
    /// Per-call timeout in seconds. Default: 120.
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 { 120 }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    #[serde(alias = "sse")]
    Http {
        url: String,
    },
}

/// Server descriptors in the `mcpServers` JSON layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpJsonConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, McpJsonServerEntry>,
}

/// A single entry of an `mcpServers` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpJsonServerEntry {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl McpJsonServerEntry {
    /// Convert to McpServerConfig. `None` when neither a command nor a url is set.
    pub fn to_server_config(&self) -> Option<McpServerConfig> {
        let transport = if let Some(ref cmd) = self.command {
            McpTransport::Stdio {
                command: cmd.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
            }
        } else if let Some(ref url) = self.url {
            McpTransport::Http { url: url.clone() }
        } else {
            return None;
        };

        Some(McpServerConfig {
            transport,
            timeout_secs: default_mcp_timeout(),
        })
    }
}

impl McpJsonConfig {
    /// Load an `mcpServers` JSON file, substituting `${VAR}` placeholders
    /// throughout the document before it is interpreted.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| QueryGraphError::ConfigNotFound(path.display().to_string()))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| QueryGraphError::Config(format!("invalid MCP server file: {}", e)))?;
        serde_json::from_value(substitute_env_vars(raw))
            .map_err(|e| QueryGraphError::Config(format!("invalid MCP server file: {}", e)))
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| QueryGraphError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        let mut config: AppConfig =
            toml::from_str(&expanded).map_err(|e| QueryGraphError::Config(e.to_string()))?;

        if let Some(mcp_path) = config.mcp_config.as_deref().map(PathBuf::from) {
            if mcp_path.is_relative() {
                if let Some(dir) = path.parent() {
                    config.mcp_config = Some(dir.join(mcp_path).display().to_string());
                }
            }
        }

        Ok(config)
    }

    /// Build a minimal config from provider API keys in the environment.
    pub fn from_env() -> Result<Self> {
        let (provider, model_id, key) = if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            ("gemini", "gemini-2.5-flash", key)
        } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            ("openai", "gpt-4o-mini", key)
        } else {
            return Err(QueryGraphError::Config(
                "no config file and neither GEMINI_API_KEY nor OPENAI_API_KEY is set".into(),
            ));
        };

        Ok(Self {
            mcp_config: Some("serversMCP.json".to_string()),
            agent: AgentConfig::default(),
            model: ModelConfig {
                provider: provider.to_string(),
                model_id: model_id.to_string(),
                api_key: Some(key),
                base_url: None,
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                retry: Some(RetryConfig::default()),
            },
            fallback_models: vec![],
            mcp: None,
        })
    }

    /// All configured MCP servers: the `mcp_config` JSON file merged under the
    /// inline `[mcp.servers]` table (inline entries win).
    pub fn mcp_servers(&self) -> Result<HashMap<String, McpServerConfig>> {
        let mut servers = self
            .mcp
            .as_ref()
            .map(|m| m.servers.clone())
            .unwrap_or_default();

        if let Some(ref path) = self.mcp_config {
            let file = McpJsonConfig::load(Path::new(path))?;
            for (name, entry) in file.mcp_servers {
                match entry.to_server_config() {
                    Some(server) => {
                        servers.entry(name).or_insert(server);
                    }
                    None => debug!(server = %name, "Skipping MCP entry without command or url"),
                }
            }
        }

        Ok(servers)
    }

    /// The descriptor of the server named by `agent.tool_server`.
    pub fn tool_server_config(&self) -> Result<McpServerConfig> {
        let name = &self.agent.tool_server;
        self.mcp_servers()?.remove(name).ok_or_else(|| {
            QueryGraphError::Config(format!("MCP server '{}' is not configured", name))
        })
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder regex"))
}

/// Expand `${ENV_VAR}` patterns in a string. Unset variables keep their
/// placeholder text.
pub fn expand_env_vars(input: &str) -> String {
    placeholder_pattern()
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expand `${ENV_VAR}` placeholders in every string of a JSON document,
/// descending into objects and arrays. Keys and non-string scalars are left
/// as they are.
pub fn substitute_env_vars(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::String(s) => Value::String(expand_env_vars(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(substitute_env_vars).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute_env_vars(v)))
                .collect(),
        ),
        other => other,
    }
}
