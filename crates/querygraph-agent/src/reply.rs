//! Parsing of structured reasoner replies.
//!
//! Replies are expected as a YAML mapping, optionally wrapped in a fenced
//! block. Every reply shape has one parse entry point here and a degraded
//! value the calling node falls back to when parsing fails.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("reply is empty")]
    Empty,

    #[error("reply is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Pull the structured block out of a raw reply: the first fence tagged
/// `yaml`/`yml` (any case), else the first fence of any kind, else the whole
/// text. The fence's language tag is never part of the block.
pub fn extract_block(raw: &str) -> &str {
    let blocks: Vec<(&str, &str)> = raw
        .split("```")
        .skip(1)
        .step_by(2)
        .map(split_info_string)
        .collect();

    blocks
        .iter()
        .find(|(tag, _)| tag.eq_ignore_ascii_case("yaml") || tag.eq_ignore_ascii_case("yml"))
        .or(blocks.first())
        .map(|&(_, body)| body.trim())
        .unwrap_or_else(|| raw.trim())
}

/// Split a fence's contents into its info string and body. A first line
/// that does not look like a language tag belongs to the body.
fn split_info_string(fenced: &str) -> (&str, &str) {
    match fenced.split_once('\n') {
        Some((tag, body))
            if tag
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')) =>
        {
            (tag.trim(), body)
        }
        _ => ("", fenced),
    }
}

/// Parse a reply into `T`. JSON replies parse too, YAML being a superset.
pub fn parse_structured_reply<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let block = extract_block(raw);
    if block.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(serde_yaml::from_str(block)?)
}

/// What the decide node asks for.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Decision {
    #[serde(default, alias = "thinking", deserialize_with = "lenient_string")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub action: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub parameters: Map<String, Value>,
}

impl Decision {
    /// Stand-in for an unparseable reply: no action, empty parameters.
    pub fn degraded(error: &ParseError) -> Self {
        Self {
            reasoning: String::new(),
            action: String::new(),
            reason: format!("Failed to parse decision: {}", error),
            parameters: Map::new(),
        }
    }
}

/// What SQL generation produces.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SqlGeneration {
    #[serde(default, alias = "thinking", deserialize_with = "lenient_string")]
    pub reasoning: String,
    #[serde(default, alias = "sqlQuery", deserialize_with = "lenient_string")]
    pub sql_query: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub explanation: String,
}

impl SqlGeneration {
    pub fn degraded(error: &ParseError) -> Self {
        Self {
            reasoning: format!("Failed to parse LLM response: {}", error),
            sql_query: String::new(),
            explanation: "Error occurred while generating SQL query".to_string(),
        }
    }
}

/// What the validate node asks for.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Validation {
    #[serde(
        default,
        rename = "isDataCorrect",
        alias = "correctData",
        alias = "is_data_correct",
        deserialize_with = "lenient_bool"
    )]
    pub is_data_correct: bool,
    #[serde(
        default,
        rename = "refinedQuestion",
        alias = "refineQuestion",
        alias = "refined_question",
        deserialize_with = "lenient_opt_string"
    )]
    pub refined_question: Option<String>,
}

impl Validation {
    /// Failing closed keeps the refinement loop going.
    pub fn degraded(_error: &ParseError) -> Self {
        Self {
            is_data_correct: false,
            refined_question: Some("Error occurred while parsing the response".to_string()),
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    })
}

/// A non-mapping `parameters` value becomes an empty mapping.
fn lenient_map<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_yaml_fence() {
        let raw = "Sure!\n```yaml\naction: list_tables\n```\ntrailing";
        assert_eq!(extract_block(raw), "action: list_tables");
    }

    #[test]
    fn test_extract_bare_fence() {
        let raw = "```\nsql_query: SELECT 1\n```";
        assert_eq!(extract_block(raw), "sql_query: SELECT 1");
    }

    #[test]
    fn test_extract_strips_any_language_tag() {
        assert_eq!(extract_block("```json\n{\"action\": \"x\"}\n```"), "{\"action\": \"x\"}");
        assert_eq!(extract_block("```yml\naction: x\n```"), "action: x");
        assert_eq!(extract_block("```YAML\naction: x\n```"), "action: x");
        assert_eq!(extract_block("```\naction: x\n```"), "action: x");
    }

    #[test]
    fn test_extract_prefers_yaml_fence() {
        let raw = "Query:\n```sql\nSELECT 1\n```\nAnswer:\n```Yaml\naction: execute_sql\n```";
        assert_eq!(extract_block(raw), "action: execute_sql");
    }

    #[test]
    fn test_extract_single_line_fence() {
        assert_eq!(extract_block("```action: list_tables```"), "action: list_tables");
        assert_eq!(extract_block("```\naction: x"), "action: x");
    }

    #[test]
    fn test_decision_from_tagged_fences() {
        let d: Decision = parse_structured_reply(
            "```json\n{\"action\": \"execute_sql\", \"parameters\": {\"query\": \"SELECT 1\"}}\n```",
        )
        .unwrap();
        assert_eq!(d.action, "execute_sql");
        assert_eq!(d.parameters["query"], "SELECT 1");

        let d: Decision = parse_structured_reply("```yml\naction: list_tables\n```").unwrap();
        assert_eq!(d.action, "list_tables");

        let v: Validation = parse_structured_reply("```YAML\nisDataCorrect: true\n```").unwrap();
        assert!(v.is_data_correct);
    }

    #[test]
    fn test_extract_raw() {
        assert_eq!(extract_block("  action: x \n"), "action: x");
    }

    #[test]
    fn test_decision_full() {
        let raw = r#"```yaml
thinking: |
    The user wants a count.
action: create_query_SQL
reason: Need a query first
parameters:
    question: How many users?
    databaseSchema:
        tables: [users]
```"#;
        let d: Decision = parse_structured_reply(raw).unwrap();
        assert_eq!(d.reasoning, "The user wants a count.");
        assert_eq!(d.action, "create_query_SQL");
        assert_eq!(d.parameters["question"], "How many users?");
        assert_eq!(d.parameters["databaseSchema"]["tables"][0], "users");
    }

    #[test]
    fn test_decision_missing_parameters() {
        let d: Decision = parse_structured_reply("action: list_tables\nreason: look around").unwrap();
        assert!(d.parameters.is_empty());
        assert_eq!(d.reason, "look around");
    }

    #[test]
    fn test_decision_non_mapping_parameters() {
        let d: Decision = parse_structured_reply("action: list_tables\nparameters: none").unwrap();
        assert!(d.parameters.is_empty());
        let d: Decision = parse_structured_reply("action: list_tables\nparameters:").unwrap();
        assert!(d.parameters.is_empty());
    }

    #[test]
    fn test_decision_from_json() {
        let d: Decision =
            parse_structured_reply(r#"{"action": "execute_sql", "parameters": {"query": "SELECT 1"}}"#)
                .unwrap();
        assert_eq!(d.action, "execute_sql");
        assert_eq!(d.parameters["query"], "SELECT 1");
    }

    #[test]
    fn test_prose_is_a_parse_error() {
        assert!(parse_structured_reply::<Decision>("I am not sure what to do.").is_err());
        assert!(matches!(
            parse_structured_reply::<Decision>("```yaml\n```"),
            Err(ParseError::Empty)
        ));
    }

    #[test]
    fn test_sql_generation_aliases() {
        let raw = "```yaml\nthinking: count rows\nsql_query: |\n    SELECT COUNT(*) FROM users;\nexplanation: counts users\n```";
        let s: SqlGeneration = parse_structured_reply(raw).unwrap();
        assert_eq!(s.sql_query, "SELECT COUNT(*) FROM users;");
        assert_eq!(s.reasoning, "count rows");

        let s: SqlGeneration = parse_structured_reply("sqlQuery: SELECT 1\nreasoning: r").unwrap();
        assert_eq!(s.sql_query, "SELECT 1");
        assert_eq!(s.reasoning, "r");
    }

    #[test]
    fn test_validation_aliases() {
        let v: Validation =
            parse_structured_reply("correctData: false\nrefineQuestion: |\n    X\n").unwrap();
        assert!(!v.is_data_correct);
        assert_eq!(v.refined_question.as_deref(), Some("X"));

        let v: Validation = parse_structured_reply("isDataCorrect: true").unwrap();
        assert!(v.is_data_correct);
        assert_eq!(v.refined_question, None);

        let v: Validation = parse_structured_reply("isDataCorrect: \"True\"").unwrap();
        assert!(v.is_data_correct);
    }

    #[test]
    fn test_degraded_values() {
        let err = parse_structured_reply::<Validation>("").unwrap_err();
        let v = Validation::degraded(&err);
        assert!(!v.is_data_correct);
        assert_eq!(
            v.refined_question.as_deref(),
            Some("Error occurred while parsing the response")
        );

        let s = SqlGeneration::degraded(&err);
        assert!(s.sql_query.is_empty());
        assert!(s.reasoning.starts_with("Failed to parse LLM response"));

        let d = Decision::degraded(&err);
        assert!(d.action.is_empty());
        assert!(d.parameters.is_empty());
    }
}
