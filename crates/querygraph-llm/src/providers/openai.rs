use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use querygraph_core::config::ModelConfig;
use querygraph_core::error::{QueryGraphError, Result};
use querygraph_core::traits::Reasoner;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible reasoner. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiReasoner {
    http: Client,
    config: ModelConfig,
}

impl OpenAiReasoner {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_API_BASE)
            .trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<OaiChoice>,
}

#[derive(Deserialize, Debug)]
struct OaiChoice {
    message: OaiReplyMessage,
}

#[derive(Deserialize, Debug)]
struct OaiReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request(config: &ModelConfig, prompt_parts: Vec<String>) -> ChatRequest {
    ChatRequest {
        model: config.model_id.clone(),
        messages: prompt_parts
            .into_iter()
            .map(|content| OaiMessage {
                role: "user",
                content,
            })
            .collect(),
        max_tokens: config.max_tokens,
        temperature: if config.temperature > 0.0 {
            Some(config.temperature)
        } else {
            None
        },
    }
}

fn extract_text(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| QueryGraphError::LlmParse("OpenAI: response has no choices".into()))
}

impl Reasoner for OpenAiReasoner {
    fn generate(&self, prompt_parts: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let body = build_request(&self.config, prompt_parts);

            let mut req = self
                .http
                .post(self.endpoint())
                .header("content-type", "application/json");

            if let Some(ref key) = self.config.api_key {
                req = req.header("authorization", format!("Bearer {}", key));
            }

            let response = req
                .json(&body)
                .send()
                .await
                .map_err(|e| QueryGraphError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(QueryGraphError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| QueryGraphError::LlmParse(e.to_string()))?;

            let text = extract_text(parsed)?;
            debug!(model = %self.config.model_id, chars = text.len(), "Chat completion received");
            Ok(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ModelConfig {
        ModelConfig {
            provider: "ollama".into(),
            model_id: "qwen2.5-coder".into(),
            api_key: None,
            base_url: Some("http://localhost:11434/v1/".into()),
            max_tokens: 2048,
            temperature: 0.2,
            retry: None,
        }
    }

    #[test]
    fn test_endpoint() {
        let reasoner = OpenAiReasoner::new(config());
        assert_eq!(reasoner.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_one_message_per_part() {
        let req = build_request(&config(), vec!["context".into(), "task".into()]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
        assert_eq!(json["messages"][1]["content"], "task");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json["temperature"].as_f64().is_some());
    }

    #[test]
    fn test_extract_text() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "hello");
    }

    #[test]
    fn test_extract_text_null_content() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "");
    }
}
