use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use querygraph_core::error::Result;
use querygraph_core::traits::Reasoner;

use crate::context::{render_schema, value_text, QueryContext, NO_QUESTION, NO_SCHEMA};
use crate::graph::{Label, Node};
use crate::reply::{parse_structured_reply, SqlGeneration};

#[derive(Debug, Clone, PartialEq)]
pub struct SqlInput {
    pub question: String,
    pub database_context: String,
}

/// Generates a read-only SQL query for the working question.
pub struct GenerateSqlNode {
    reasoner: Arc<dyn Reasoner>,
    dialect: String,
}

impl GenerateSqlNode {
    pub fn new(reasoner: Arc<dyn Reasoner>, dialect: impl Into<String>) -> Self {
        Self {
            reasoner,
            dialect: dialect.into(),
        }
    }

    fn prompt(&self, input: &SqlInput) -> String {
        format!(
            r#"
You are a SQL expert. Generate a SQL query to answer the user's question.

### USER QUESTION
{question}

### DATABASE CONTEXT
{database_context}

### TASK
Generate a SQL query that will answer the user's question. The query should be:
1. Valid {dialect} syntax
2. Efficient and well-structured
3. Safe to execute (read-only, no DDL or data modification)
4. Focused on answering the specific question
5. Based on the database schema and context above
6. Quoting camelCase identifiers with double quotes

### OUTPUT FORMAT
Return your response in this exact YAML format:

```yaml
thinking: |
    <your step-by-step reasoning about what tables to query, what joins are needed, etc.>
sql_query: |
    <the actual SQL query>
explanation: |
    <brief explanation of what the query does and how it answers the question>
```

### IMPORTANT
- Only return the YAML block, no additional text
- The SQL query should be properly formatted and ready to execute
- If you cannot generate a valid query, explain why in the thinking section
"#,
            question = input.question,
            database_context = input.database_context,
            dialect = self.dialect,
        )
    }
}

impl Node<QueryContext> for GenerateSqlNode {
    type Prepared = SqlInput;
    type Output = SqlGeneration;

    fn name(&self) -> &str {
        super::GENERATE_SQL
    }

    /// Parameters of a pending `create_query_SQL` action take precedence
    /// over the top-level question and database context.
    fn prepare(&self, ctx: &QueryContext) -> SqlInput {
        if let Some(question) = ctx.action_parameters.as_ref().and_then(|p| p.get("question")) {
            let schema = ctx
                .action_parameters
                .as_ref()
                .and_then(|p| p.get("databaseSchema"))
                .and_then(render_schema);
            return SqlInput {
                question: value_text(question),
                database_context: schema.unwrap_or_else(|| NO_SCHEMA.to_string()),
            };
        }

        SqlInput {
            question: ctx.question.as_deref().unwrap_or(NO_QUESTION).to_string(),
            database_context: ctx.database_context.as_deref().unwrap_or(NO_SCHEMA).to_string(),
        }
    }

    fn execute<'a>(&'a self, input: &'a SqlInput) -> BoxFuture<'a, Result<SqlGeneration>> {
        Box::pin(async move {
            let reply = self.reasoner.generate(vec![self.prompt(input)]).await?;
            Ok(match parse_structured_reply::<SqlGeneration>(&reply) {
                Ok(sql) => sql,
                Err(e) => {
                    warn!(error = %e, "Could not parse SQL generation reply");
                    SqlGeneration::degraded(&e)
                }
            })
        })
    }

    fn finalize(&self, ctx: &mut QueryContext, _input: SqlInput, sql: SqlGeneration) -> Label {
        info!(query = %sql.sql_query, "SQL query generated");
        ctx.query_used = Some(sql.sql_query);
        ctx.query_thinking = Some(sql.reasoning);
        ctx.query_explanation = Some(sql.explanation);
        Label::from(super::TO_DECIDE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Step;
    use querygraph_test_utils::ScriptedReasoner;
    use serde_json::json;

    const SQL_MARKER: &str = "You are a SQL expert";

    fn node(reply: &str) -> (Arc<ScriptedReasoner>, GenerateSqlNode) {
        let reasoner = Arc::new(ScriptedReasoner::new().on(SQL_MARKER, reply));
        (reasoner.clone(), GenerateSqlNode::new(reasoner, "PostgreSQL"))
    }

    #[test]
    fn test_prepare_prefers_action_parameters() {
        let (_, node) = node("");
        let mut ctx = QueryContext::new("top-level question", "Tables: orders");
        ctx.action_parameters = Some(
            json!({"question": "How many users?", "databaseSchema": {"tables": ["users"]}})
                .as_object()
                .cloned()
                .unwrap(),
        );

        let input = node.prepare(&ctx);
        assert_eq!(input.question, "How many users?");
        assert_eq!(input.database_context, r#"{"tables":["users"]}"#);
    }

    #[test]
    fn test_prepare_falls_back_to_context() {
        let (_, node) = node("");
        let input = node.prepare(&QueryContext::default());
        assert_eq!(input.question, "No question provided.");
        assert_eq!(input.database_context, "No database context provided.");
    }

    #[tokio::test]
    async fn test_writes_query_fields() {
        let (reasoner, node) = node(
            "```yaml\nthinking: |\n    count the rows\nsql_query: |\n    SELECT COUNT(*) FROM users;\nexplanation: |\n    Counts users.\n```",
        );
        let mut ctx = QueryContext::new("How many users?", "Tables: users(id,name)");

        let label = node.step(&mut ctx).await.unwrap();
        assert_eq!(label.as_str(), "decide");
        assert_eq!(ctx.query_used.as_deref(), Some("SELECT COUNT(*) FROM users;"));
        assert_eq!(ctx.query_thinking.as_deref(), Some("count the rows"));
        assert_eq!(ctx.query_explanation.as_deref(), Some("Counts users."));

        let prompt = &reasoner.prompts_with(SQL_MARKER)[0];
        assert!(prompt.contains("### USER QUESTION\nHow many users?"));
        assert!(prompt.contains("Tables: users(id,name)"));
        assert!(prompt.contains("Valid PostgreSQL syntax"));
    }

    #[tokio::test]
    async fn test_parse_failure_is_degraded() {
        let (_, node) = node("Sorry, I cannot help with that.");
        let mut ctx = QueryContext::new("q", "");

        node.step(&mut ctx).await.unwrap();
        assert_eq!(ctx.query_used.as_deref(), Some(""));
        assert!(ctx
            .query_thinking
            .as_deref()
            .unwrap()
            .starts_with("Failed to parse LLM response"));
        assert_eq!(
            ctx.query_explanation.as_deref(),
            Some("Error occurred while generating SQL query")
        );
    }
}
