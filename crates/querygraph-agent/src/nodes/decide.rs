use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use querygraph_core::error::Result;
use querygraph_core::traits::Reasoner;

use crate::action::Action;
use crate::context::{QueryContext, NO_DATABASE_CONTEXT, NO_QUERY_USED, NO_TOOL_INFO};
use crate::graph::{Label, Node};
use crate::reply::{parse_structured_reply, Decision};

/// Inputs of the decide prompt, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DecideInput {
    pub tool_summary: String,
    pub question: String,
    pub database_context: String,
    pub query_used: String,
    pub query_result: String,
}

/// Asks the reasoner for the next action and routes on it.
pub struct DecideNode {
    reasoner: Arc<dyn Reasoner>,
}

impl DecideNode {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

fn decide_prompt(input: &DecideInput) -> String {
    format!(
        r#"
### CONTEXT
You are a data analyst that can query a database and provide the response to the answer the person is asking.
Question: {question}
Database Context: {database_context}
Query Used: {query_used}
Query Result: {query_result}

### ACTION SPACE
{tool_summary}

## NEXT ACTION
Decide the next action based on the context and available actions.
Return your response in this format:

```yaml
thinking: |
    <your step-by-step reasoning process>
action: <tool_name_from_action_space>
reason: <why you chose this action>
parameters: <parameters for the chosen tool>
```"#,
        question = input.question,
        database_context = input.database_context,
        query_used = input.query_used,
        query_result = input.query_result,
        tool_summary = input.tool_summary,
    )
}

impl Node<QueryContext> for DecideNode {
    type Prepared = DecideInput;
    type Output = Decision;

    fn name(&self) -> &str {
        super::DECIDE
    }

    fn prepare(&self, ctx: &QueryContext) -> DecideInput {
        DecideInput {
            tool_summary: ctx.tool_summary.as_deref().unwrap_or(NO_TOOL_INFO).to_string(),
            question: ctx.question_or_default().to_string(),
            database_context: ctx
                .database_context
                .as_deref()
                .unwrap_or(NO_DATABASE_CONTEXT)
                .to_string(),
            query_used: ctx.query_used.as_deref().unwrap_or(NO_QUERY_USED).to_string(),
            query_result: ctx.query_result_text(),
        }
    }

    fn execute<'a>(&'a self, input: &'a DecideInput) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(async move {
            let reply = self.reasoner.generate(vec![decide_prompt(input)]).await?;
            let decision = match parse_structured_reply::<Decision>(&reply) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(error = %e, "Could not parse decision, continuing without an action");
                    Decision::degraded(&e)
                }
            };
            debug!(reasoning = %decision.reasoning, "Decision reasoning");
            Ok(decision)
        })
    }

    fn finalize(&self, ctx: &mut QueryContext, _input: DecideInput, decision: Decision) -> Label {
        let action = Action::parse(&decision.action);
        info!(action = %action, reason = %decision.reason, "Action chosen");
        if !action.is_known() {
            warn!(action = %action, "Reasoner chose an action without a route");
        }

        ctx.chosen_action = Some(decision.action);
        ctx.action_reason = Some(decision.reason);
        ctx.action_parameters = Some(decision.parameters);
        action.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Step;
    use querygraph_test_utils::ScriptedReasoner;

    const DECIDE_MARKER: &str = "## NEXT ACTION";

    #[test]
    fn test_prepare_defaults() {
        let node = DecideNode::new(Arc::new(ScriptedReasoner::new()));
        let input = node.prepare(&QueryContext::default());
        assert_eq!(input.tool_summary, "No tool information provided.");
        assert_eq!(input.question, "No question provided.");
        assert_eq!(input.database_context, "No database list of tables and context provided.");
        assert_eq!(input.query_used, "No query used.");
        assert_eq!(input.query_result, "No query result returned.");
    }

    #[test]
    fn test_prompt_embeds_inputs() {
        let input = DecideInput {
            tool_summary: "[1] list_tables".into(),
            question: "How many users?".into(),
            database_context: "Tables: users".into(),
            query_used: "SELECT 1".into(),
            query_result: "1".into(),
        };
        let prompt = decide_prompt(&input);
        assert!(prompt.contains("Question: How many users?"));
        assert!(prompt.contains("Database Context: Tables: users"));
        assert!(prompt.contains("### ACTION SPACE\n[1] list_tables"));
        assert!(prompt.contains(DECIDE_MARKER));
    }

    #[tokio::test]
    async fn test_routes_on_chosen_action() {
        let reasoner = Arc::new(ScriptedReasoner::new().on(
            DECIDE_MARKER,
            "```yaml\naction: execute_sql\nreason: run it\nparameters:\n  query: SELECT 1\n```",
        ));
        let node = DecideNode::new(reasoner);
        let mut ctx = QueryContext::new("q", "");

        let label = node.step(&mut ctx).await.unwrap();
        assert_eq!(label.as_str(), "execute_sql");
        assert_eq!(ctx.chosen_action.as_deref(), Some("execute_sql"));
        assert_eq!(ctx.action_reason.as_deref(), Some("run it"));
        assert_eq!(ctx.action_parameters.unwrap()["query"], "SELECT 1");
    }

    #[tokio::test]
    async fn test_unparseable_reply_degrades() {
        let reasoner = Arc::new(ScriptedReasoner::new().on(DECIDE_MARKER, "I would list the tables."));
        let node = DecideNode::new(reasoner);
        let mut ctx = QueryContext::new("q", "");

        let label = node.step(&mut ctx).await.unwrap();
        assert_eq!(label.as_str(), "");
        assert_eq!(ctx.chosen_action.as_deref(), Some(""));
        assert!(ctx.action_reason.unwrap().starts_with("Failed to parse decision"));
        assert!(ctx.action_parameters.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reasoner_failure_is_hard() {
        let reasoner = Arc::new(ScriptedReasoner::new().fail_on(DECIDE_MARKER, "HTTP 401: bad key"));
        let node = DecideNode::new(reasoner);
        let mut ctx = QueryContext::new("q", "");

        assert!(node.step(&mut ctx).await.is_err());
        assert!(ctx.chosen_action.is_none());
    }
}
