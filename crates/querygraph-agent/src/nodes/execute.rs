use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{info, warn};

use querygraph_core::error::Result;
use querygraph_core::traits::ToolInvoker;

use crate::action::Action;
use crate::context::QueryContext;
use crate::graph::{Label, Node, SubFlow};
use crate::reply::SqlGeneration;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteInput {
    pub action: Action,
    pub parameters: Map<String, Value>,
}

/// How an action execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The result was produced and should be validated.
    Stored,
    /// The tool failed; the error text is the result.
    Failed,
    /// Nothing to execute.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Output of the embedded SQL generation.
    Sql(SqlGeneration),
    /// Raw tool result, or the error text of a failed call.
    Result(Value),
    Nothing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub tool: String,
    pub outcome: Outcome,
    pub payload: Payload,
}

/// Carries out the chosen action.
///
/// `create_query_SQL` runs the SQL generation sub-flow over a scoped
/// context; every other action goes to the tool invoker. Tool failures
/// become data for the validate step instead of failing the run.
pub struct ExecuteNode {
    invoker: Arc<dyn ToolInvoker>,
    sql_flow: SubFlow<QueryContext>,
}

impl ExecuteNode {
    pub fn new(invoker: Arc<dyn ToolInvoker>, sql_flow: SubFlow<QueryContext>) -> Self {
        Self { invoker, sql_flow }
    }

    async fn generate_sql(&self, parameters: &Map<String, Value>) -> Result<Execution> {
        let scoped = QueryContext::for_sql_generation(parameters);
        let done = self.sql_flow.run(scoped).await?;
        Ok(Execution {
            tool: Action::CREATE_QUERY_SQL.to_string(),
            outcome: Outcome::Stored,
            payload: Payload::Sql(SqlGeneration {
                reasoning: done.query_thinking.unwrap_or_default(),
                sql_query: done.query_used.unwrap_or_default(),
                explanation: done.query_explanation.unwrap_or_default(),
            }),
        })
    }

    async fn invoke(&self, tool: &str, parameters: &Map<String, Value>) -> Execution {
        match self.invoker.call(tool, parameters.clone()).await {
            Ok(result) => Execution {
                tool: tool.to_string(),
                outcome: Outcome::Stored,
                payload: Payload::Result(result),
            },
            Err(e) => {
                warn!(tool, error = %e, "Tool call failed");
                Execution {
                    tool: tool.to_string(),
                    outcome: Outcome::Failed,
                    payload: Payload::Result(Value::String(format!("Error: {}", e))),
                }
            }
        }
    }
}

impl Node<QueryContext> for ExecuteNode {
    type Prepared = ExecuteInput;
    type Output = Execution;

    fn name(&self) -> &str {
        super::EXECUTE
    }

    fn prepare(&self, ctx: &QueryContext) -> ExecuteInput {
        ExecuteInput {
            action: Action::parse(ctx.chosen_action.as_deref().unwrap_or_default()),
            parameters: ctx.action_parameters.clone().unwrap_or_default(),
        }
    }

    fn execute<'a>(&'a self, input: &'a ExecuteInput) -> BoxFuture<'a, Result<Execution>> {
        Box::pin(async move {
            match input.action {
                Action::Unknown(ref name) if name.is_empty() => Ok(Execution {
                    tool: String::new(),
                    outcome: Outcome::Skipped,
                    payload: Payload::Nothing,
                }),
                Action::CreateQuerySql => self.generate_sql(&input.parameters).await,
                ref action => Ok(self.invoke(action.as_str(), &input.parameters).await),
            }
        })
    }

    fn finalize(&self, ctx: &mut QueryContext, _input: ExecuteInput, execution: Execution) -> Label {
        match execution.payload {
            Payload::Sql(sql) => {
                ctx.query_used = Some(sql.sql_query);
                ctx.query_explanation = Some(sql.explanation);
                ctx.query_thinking = Some(sql.reasoning);
            }
            Payload::Result(value) => ctx.query_result = Some(value),
            Payload::Nothing => {}
        }

        match execution.outcome {
            Outcome::Stored | Outcome::Failed => {
                let success = execution.outcome == Outcome::Stored;
                info!(tool = %execution.tool, success, "Action executed");
                ctx.tool_success = Some(success);
                ctx.last_tool = Some(execution.tool);
                Label::from(super::TO_VALIDATE)
            }
            Outcome::Skipped => {
                warn!("No action to execute, returning to decide");
                Label::from(super::TO_DECIDE)
            }
        }
    }
}
