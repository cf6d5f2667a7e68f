use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use querygraph_core::config::AgentConfig;
use querygraph_core::error::Result;
use querygraph_core::traits::{Reasoner, ToolInvoker, ToolRegistry};
use querygraph_core::types::{RunId, ToolDescriptor};

use crate::action::Action;
use crate::context::QueryContext;
use crate::graph::{
    Edge, EdgeTable, ExecutionResult, FlowEngine, FlowLimits, RunOutcome, Step, StepRecord, SubFlow,
};
use crate::nodes::{
    self, DecideNode, ExecuteNode, GenerateSqlNode, ToolDiscoveryNode, UnknownActionNode,
    ValidateNode,
};
use crate::reply::SqlGeneration;

/// Summary of one agent run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentReport {
    Completed {
        run_id: RunId,
        started_at: DateTime<Utc>,
        /// Working question at the end of the run, after any refinement.
        question: String,
        query_used: Option<String>,
        query_result: Option<Value>,
        query_explanation: Option<String>,
        chosen_action: Option<String>,
        action_reason: Option<String>,
        is_data_correct: Option<bool>,
        outcome: RunOutcome,
        steps: Vec<StepRecord>,
    },
    Failed {
        run_id: RunId,
        error: String,
        question: String,
        /// The failure stems from missing or invalid configuration.
        config_error: bool,
    },
}

impl AgentReport {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::Completed { run_id, .. } | Self::Failed { run_id, .. } => run_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the run failed on missing or invalid configuration.
    pub fn is_config_failure(&self) -> bool {
        matches!(self, Self::Failed { config_error: true, .. })
    }
}

/// The data-query agent.
///
/// Owns the collaborators and builds the reference graph:
///
/// ```text
/// tool_discovery -> decide
/// decide --create_query_SQL|execute_sql|list_tables--> execute
/// decide --(anything else)--> unknown_action -> decide
/// execute -> validate -> decide
/// ```
///
/// `create_query_SQL` is served in-process by a one-node SQL generation flow
/// embedded in the execute node.
pub struct QueryAgent {
    reasoner: Arc<dyn Reasoner>,
    registry: Arc<dyn ToolRegistry>,
    invoker: Arc<dyn ToolInvoker>,
    config: AgentConfig,
    cancel: CancellationToken,
}

impl QueryAgent {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        registry: Arc<dyn ToolRegistry>,
        invoker: Arc<dyn ToolInvoker>,
        config: AgentConfig,
    ) -> Self {
        Self {
            reasoner,
            registry,
            invoker,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Agent-wide token. Cancelling it stops every run in flight and every
    /// run started afterwards.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A token scoped to a single run. It fires with the agent-wide token,
    /// while cancelling it leaves other runs alone.
    pub fn run_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn limits(&self) -> FlowLimits {
        FlowLimits {
            max_steps: self.config.max_steps,
            max_duration: (self.config.max_duration_secs > 0)
                .then(|| Duration::from_secs(self.config.max_duration_secs)),
        }
    }

    fn sql_engine(&self, cancel: CancellationToken) -> Result<FlowEngine<QueryContext>> {
        let node: Arc<dyn Step<QueryContext>> = Arc::new(GenerateSqlNode::new(
            self.reasoner.clone(),
            self.config.sql_dialect.clone(),
        ));
        Ok(FlowEngine::new(vec![node], EdgeTable::new(), nodes::GENERATE_SQL)?
            .with_limits(self.limits())
            .with_cancellation(cancel))
    }

    /// Build the agent graph with a fresh run-scoped cancellation token.
    pub fn graph(&self) -> Result<FlowEngine<QueryContext>> {
        self.graph_with(self.run_token())
    }

    fn graph_with(&self, cancel: CancellationToken) -> Result<FlowEngine<QueryContext>> {
        let sql_flow = SubFlow::new("sql_generation", self.sql_engine(cancel.clone())?);
        let steps: Vec<Arc<dyn Step<QueryContext>>> = vec![
            Arc::new(ToolDiscoveryNode::new(
                self.registry.clone(),
                self.config.tool_server.clone(),
            )),
            Arc::new(DecideNode::new(self.reasoner.clone())),
            Arc::new(ExecuteNode::new(self.invoker.clone(), sql_flow)),
            Arc::new(ValidateNode::new(self.reasoner.clone())),
            Arc::new(UnknownActionNode::new()),
        ];

        let mut edges = EdgeTable::new()
            .with(Edge::on(nodes::TOOL_DISCOVERY, nodes::TO_DECIDE, nodes::DECIDE))
            .with(Edge::otherwise(nodes::DECIDE, nodes::UNKNOWN_ACTION))
            .with(Edge::on(nodes::UNKNOWN_ACTION, nodes::TO_DECIDE, nodes::DECIDE))
            .with(Edge::on(nodes::EXECUTE, nodes::TO_VALIDATE, nodes::VALIDATE))
            .with(Edge::on(nodes::EXECUTE, nodes::TO_DECIDE, nodes::DECIDE))
            .with(Edge::on(nodes::VALIDATE, nodes::TO_DECIDE, nodes::DECIDE));
        for action in Action::routable() {
            edges.insert(Edge::on(nodes::DECIDE, action.label(), nodes::EXECUTE));
        }

        let mut engine = FlowEngine::new(steps, edges, nodes::TOOL_DISCOVERY)?
            .with_limits(self.limits())
            .with_cancellation(cancel);
        if self.config.stop_on_validated {
            engine = engine.halt_when(|ctx: &QueryContext| ctx.is_data_correct == Some(true));
        }
        Ok(engine)
    }

    /// Run the agent graph over a caller-owned context.
    ///
    /// Errors are hard failures (reasoner transport, invalid graph). Tool
    /// failures and unparseable replies never surface here.
    pub async fn run_with_context(&self, ctx: &mut QueryContext) -> Result<ExecutionResult> {
        self.run_with_context_until(ctx, self.run_token()).await
    }

    /// Like `run_with_context`, stopping when `cancel` fires. Pass a token
    /// from `run_token` to keep the agent-wide token in effect.
    pub async fn run_with_context_until(
        &self,
        ctx: &mut QueryContext,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult> {
        // A verdict left over from an earlier run would halt this one at once.
        ctx.is_data_correct = None;
        self.graph_with(cancel)?.run(ctx).await
    }

    /// Answer `question`, optionally guided by a description of the database.
    pub async fn run(&self, question: &str, database_context: &str) -> AgentReport {
        self.run_until(question, database_context, self.run_token()).await
    }

    /// Like `run`, stopping when `cancel` fires.
    pub async fn run_until(
        &self,
        question: &str,
        database_context: &str,
        cancel: CancellationToken,
    ) -> AgentReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        info!(run_id = %run_id, question, "Agent run started");

        let mut ctx = QueryContext::new(question, database_context);
        match self.run_with_context_until(&mut ctx, cancel).await {
            Ok(result) => {
                info!(
                    run_id = %run_id,
                    outcome = ?result.outcome,
                    steps = result.steps.len(),
                    elapsed_ms = result.total_elapsed_ms,
                    "Agent run finished"
                );
                AgentReport::Completed {
                    run_id,
                    started_at,
                    question: ctx.question_or_default().to_string(),
                    query_used: ctx.query_used,
                    query_result: ctx.query_result,
                    query_explanation: ctx.query_explanation,
                    chosen_action: ctx.chosen_action,
                    action_reason: ctx.action_reason,
                    is_data_correct: ctx.is_data_correct,
                    outcome: result.outcome,
                    steps: result.steps,
                }
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Agent run failed");
                AgentReport::Failed {
                    run_id,
                    error: e.to_string(),
                    question: question.to_string(),
                    config_error: e.is_config(),
                }
            }
        }
    }

    /// Generate SQL for `question` without touching any tool.
    pub async fn generate_sql(&self, question: &str, database_context: &str) -> Result<SqlGeneration> {
        let mut ctx = QueryContext::new(question, database_context);
        self.sql_engine(self.run_token())?.run(&mut ctx).await?;
        Ok(SqlGeneration {
            reasoning: ctx.query_thinking.unwrap_or_default(),
            sql_query: ctx.query_used.unwrap_or_default(),
            explanation: ctx.query_explanation.unwrap_or_default(),
        })
    }

    /// Tools the agent would offer the reasoner, built-ins included.
    pub async fn discover_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let node: Arc<dyn Step<QueryContext>> = Arc::new(ToolDiscoveryNode::new(
            self.registry.clone(),
            self.config.tool_server.clone(),
        ));
        let engine = FlowEngine::new(vec![node], EdgeTable::new(), nodes::TOOL_DISCOVERY)?;
        let mut ctx = QueryContext::default();
        engine.run(&mut ctx).await?;
        Ok(ctx.available_tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use querygraph_core::error::QueryGraphError;
    use querygraph_test_utils::{ScriptedReasoner, StubTools};

    struct Unconfigured;

    impl Reasoner for Unconfigured {
        fn generate(&self, _prompt_parts: Vec<String>) -> BoxFuture<'_, Result<String>> {
            Box::pin(async { Err(QueryGraphError::Config("Gemini api_key is not set".into())) })
        }
    }

    fn agent() -> QueryAgent {
        let tools = Arc::new(StubTools::new(vec![]));
        QueryAgent::new(
            Arc::new(ScriptedReasoner::new()),
            tools.clone(),
            tools,
            AgentConfig::default(),
        )
    }

    #[test]
    fn test_graph_wiring() {
        let engine = agent().graph().unwrap();
        assert_eq!(engine.entry(), "tool_discovery");
        assert_eq!(engine.limits().max_steps, 25);
        assert_eq!(engine.limits().max_duration, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_zero_duration_disables_time_budget() {
        let mut a = agent();
        a.config.max_duration_secs = 0;
        assert_eq!(a.limits().max_duration, None);
    }

    #[tokio::test]
    async fn test_discover_tools_includes_builtin() {
        let tools = agent().discover_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "create_query_SQL");
    }

    #[test]
    fn test_report_serializes_status() {
        let report = AgentReport::Failed {
            run_id: RunId::new(),
            error: "boom".into(),
            question: "q".into(),
            config_error: false,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
        assert!(report.is_failed());
    }

    #[tokio::test]
    async fn test_config_failure_is_flagged() {
        let tools = Arc::new(StubTools::new(vec![]));
        let agent = QueryAgent::new(Arc::new(Unconfigured), tools.clone(), tools, AgentConfig::default());

        let report = agent.run("How many users?", "").await;
        assert!(report.is_failed());
        assert!(report.is_config_failure());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["config_error"], true);
    }
}
