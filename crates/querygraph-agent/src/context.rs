use serde::Serialize;
use serde_json::{Map, Value};

use querygraph_core::types::ToolDescriptor;

// Defaults shown to the reasoner for fields no node has written yet.
pub const NO_TOOL_INFO: &str = "No tool information provided.";
pub const NO_QUESTION: &str = "No question provided.";
pub const NO_DATABASE_CONTEXT: &str = "No database list of tables and context provided.";
pub const NO_SCHEMA: &str = "No database context provided.";
pub const NO_QUERY_USED: &str = "No query used.";
pub const NO_QUERY_RESULT: &str = "No query result returned.";
pub const NO_QUERY_THINKING: &str = "No query thinking provided.";
pub const NO_QUERY_EXPLANATION: &str = "No query explanation provided.";

/// State shared by every node of one agent run.
///
/// Fields start out unset and are written by the nodes; readers fall back to
/// the `NO_*` defaults. Every write replaces the whole field.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    /// Working question. Validation may replace it with a refined one.
    pub question: Option<String>,
    pub database_context: Option<String>,
    pub query_used: Option<String>,
    pub query_result: Option<Value>,
    pub query_thinking: Option<String>,
    pub query_explanation: Option<String>,
    pub is_data_correct: Option<bool>,
    pub chosen_action: Option<String>,
    pub action_reason: Option<String>,
    pub action_parameters: Option<Map<String, Value>>,
    pub available_tools: Vec<ToolDescriptor>,
    pub tool_summary: Option<String>,
    /// Whether the last executed action succeeded.
    pub tool_success: Option<bool>,
    pub last_tool: Option<String>,
}

impl QueryContext {
    /// Context for a fresh run. An empty database context counts as absent.
    pub fn new(question: impl Into<String>, database_context: impl Into<String>) -> Self {
        let database_context = database_context.into();
        Self {
            question: Some(question.into()),
            database_context: (!database_context.trim().is_empty()).then_some(database_context),
            ..Self::default()
        }
    }

    /// Scoped context for an embedded SQL-generation run, seeded from the
    /// parameters of a `create_query_SQL` action. Query fields start cleared.
    pub fn for_sql_generation(parameters: &Map<String, Value>) -> Self {
        Self {
            question: Some(
                parameters
                    .get("question")
                    .map(value_text)
                    .unwrap_or_default(),
            ),
            database_context: parameters.get("databaseSchema").and_then(render_schema),
            ..Self::default()
        }
    }

    pub fn question_or_default(&self) -> &str {
        self.question.as_deref().unwrap_or(NO_QUESTION)
    }

    /// The query result as prompt text.
    pub fn query_result_text(&self) -> String {
        match self.query_result {
            Some(ref value) => value_text(value),
            None => NO_QUERY_RESULT.to_string(),
        }
    }
}

/// Text form of a JSON value: strings verbatim, everything else as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a `databaseSchema` parameter for a prompt. Null and empty values
/// count as absent.
pub fn render_schema(schema: &Value) -> Option<String> {
    let empty = match schema {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    };
    (!empty).then(|| value_text(schema))
}

/// Numbered, human-readable listing of tools for the decide prompt.
pub fn render_tool_summary(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .enumerate()
        .map(|(i, tool)| {
            let params: Vec<String> = tool
                .parameters
                .iter()
                .map(|p| {
                    let status = if p.required { "(Required)" } else { "(Optional)" };
                    format!("    - {} ({}): {}", p.name, p.kind, status)
                })
                .collect();
            format!(
                "[{}] {}\n  Description: {}\n  Parameters:\n{}",
                i + 1,
                tool.name,
                tool.description,
                params.join("\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygraph_core::types::ToolParameter;
    use serde_json::json;

    #[test]
    fn test_new_treats_blank_context_as_absent() {
        let ctx = QueryContext::new("How many users?", "  ");
        assert_eq!(ctx.question.as_deref(), Some("How many users?"));
        assert!(ctx.database_context.is_none());
        assert_eq!(ctx.query_result_text(), NO_QUERY_RESULT);
    }

    #[test]
    fn test_sql_generation_scope() {
        let params = json!({
            "question": "How many users?",
            "databaseSchema": {"tables": ["users"]}
        });
        let ctx = QueryContext::for_sql_generation(params.as_object().unwrap());
        assert_eq!(ctx.question.as_deref(), Some("How many users?"));
        assert_eq!(ctx.database_context.as_deref(), Some(r#"{"tables":["users"]}"#));
        assert!(ctx.query_used.is_none());
        assert!(ctx.action_parameters.is_none());
    }

    #[test]
    fn test_sql_generation_scope_without_schema() {
        let params = json!({ "question": "q", "databaseSchema": {} });
        let ctx = QueryContext::for_sql_generation(params.as_object().unwrap());
        assert!(ctx.database_context.is_none());

        let ctx = QueryContext::for_sql_generation(&Map::new());
        assert_eq!(ctx.question.as_deref(), Some(""));
    }

    #[test]
    fn test_query_result_text() {
        let mut ctx = QueryContext::default();
        ctx.query_result = Some(json!("Error: boom"));
        assert_eq!(ctx.query_result_text(), "Error: boom");
        ctx.query_result = Some(json!([{"count": 3}]));
        assert_eq!(ctx.query_result_text(), r#"[{"count":3}]"#);
    }

    #[test]
    fn test_render_tool_summary() {
        let tools = vec![
            ToolDescriptor::new(
                "execute_sql",
                "Run SQL",
                vec![
                    ToolParameter::new("project_id", "string", true),
                    ToolParameter::new("limit", "integer", false),
                ],
            ),
            ToolDescriptor::new("list_tables", "List tables", vec![]),
        ];
        let summary = render_tool_summary(&tools);
        assert_eq!(
            summary,
            "[1] execute_sql\n  Description: Run SQL\n  Parameters:\n    - project_id (string): (Required)\n    - limit (integer): (Optional)\n[2] list_tables\n  Description: List tables\n  Parameters:\n"
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let ctx = QueryContext::new("q", "t");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["databaseContext"], "t");
        assert!(json.get("isDataCorrect").is_some());
    }
}
