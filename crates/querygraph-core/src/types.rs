use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one agent run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            required,
        }
    }
}

/// An invocable capability offered to the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Build a descriptor from a JSON-schema object (`properties` + `required`).
    ///
    /// Parameter order follows the order of `properties`. A property without
    /// a `type` is reported as `"unknown"`.
    pub fn from_input_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let parameters = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(param, info)| {
                        let kind = info
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("unknown");
                        ToolParameter::new(param.clone(), kind, required.contains(&param.as_str()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_schema() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string" },
                "query": { "type": "string" },
                "limit": {}
            },
            "required": ["query"]
        });
        let tool = ToolDescriptor::from_input_schema(
            "execute_sql",
            "Run SQL",
            schema.as_object().unwrap(),
        );

        assert_eq!(tool.name, "execute_sql");
        assert_eq!(tool.parameters.len(), 3);
        let query = tool.parameters.iter().find(|p| p.name == "query").unwrap();
        assert!(query.required);
        assert_eq!(query.kind, "string");
        let limit = tool.parameters.iter().find(|p| p.name == "limit").unwrap();
        assert!(!limit.required);
        assert_eq!(limit.kind, "unknown");
    }

    #[test]
    fn test_from_empty_schema() {
        let tool = ToolDescriptor::from_input_schema("list_tables", "", &serde_json::Map::new());
        assert!(tool.parameters.is_empty());
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
