use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use querygraph_core::error::Result;

use crate::action::Action;
use crate::context::QueryContext;
use crate::graph::{Label, Node};

/// Fallback target for actions with no route out of decide.
///
/// Stores a diagnostic as the query result so the next decision can see
/// what went wrong, then hands control back to decide.
#[derive(Debug, Default)]
pub struct UnknownActionNode;

impl UnknownActionNode {
    pub fn new() -> Self {
        Self
    }
}

fn diagnostic(action: &str) -> String {
    let choices = Action::routable()
        .iter()
        .map(Action::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if action.is_empty() {
        format!("Error: no action was chosen. Choose one of: {}.", choices)
    } else {
        format!("Error: action '{}' is not available. Choose one of: {}.", action, choices)
    }
}

impl Node<QueryContext> for UnknownActionNode {
    type Prepared = String;
    type Output = String;

    fn name(&self) -> &str {
        super::UNKNOWN_ACTION
    }

    fn prepare(&self, ctx: &QueryContext) -> String {
        ctx.chosen_action.as_deref().unwrap_or_default().trim().to_string()
    }

    fn execute<'a>(&'a self, action: &'a String) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(diagnostic(action)) })
    }

    fn finalize(&self, ctx: &mut QueryContext, action: String, message: String) -> Label {
        warn!(action = %action, "Unknown action, returning to decide");
        ctx.query_result = Some(Value::String(message));
        ctx.tool_success = Some(false);
        Label::from(super::TO_DECIDE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Step;

    #[tokio::test]
    async fn test_records_diagnostic() {
        let mut ctx = QueryContext::new("q", "");
        ctx.chosen_action = Some("drop_table".into());

        let label = UnknownActionNode::new().step(&mut ctx).await.unwrap();
        assert_eq!(label.as_str(), "decide");
        assert_eq!(
            ctx.query_result_text(),
            "Error: action 'drop_table' is not available. Choose one of: create_query_SQL, execute_sql, list_tables."
        );
        assert_eq!(ctx.tool_success, Some(false));
    }

    #[test]
    fn test_empty_action_diagnostic() {
        assert!(diagnostic("").starts_with("Error: no action was chosen."));
    }
}
