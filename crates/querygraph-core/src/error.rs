use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryGraphError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Tool errors
    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    // MCP transport errors
    #[error("MCP error: {0}")]
    Mcp(String),

    // Flow errors
    #[error("Node not found in graph: {0}")]
    NodeNotFound(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryGraphError {
    /// Whether this error stems from missing or invalid configuration
    /// (credentials, config files, server descriptors).
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ConfigNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_config() {
        assert!(QueryGraphError::Config("no key".into()).is_config());
        assert!(QueryGraphError::ConfigNotFound("x.toml".into()).is_config());
        assert!(!QueryGraphError::Mcp("closed".into()).is_config());
    }

    #[test]
    fn test_tool_execution_display() {
        let err = QueryGraphError::ToolExecution {
            tool: "execute_sql".into(),
            message: "relation does not exist".into(),
        };
        assert_eq!(
            err.to_string(),
            "Tool execution failed: execute_sql: relation does not exist"
        );
    }
}
