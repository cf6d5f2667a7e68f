use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use querygraph_core::config::ModelConfig;
use querygraph_core::error::{QueryGraphError, Result};
use querygraph_core::traits::Reasoner;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini native API reasoner.
///
/// Every prompt part is sent as one text part of a single user turn;
/// thinking is disabled.
pub struct GeminiReasoner {
    http: Client,
    config: ModelConfig,
}

impl GeminiReasoner {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self, api_key: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_BASE)
            .trim_end_matches('/');
        format!(
            "{}/models/{}:generateContent?key={}",
            base, self.config.model_id, api_key
        )
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn build_request(config: &ModelConfig, prompt_parts: Vec<String>) -> GenerateRequest {
    GenerateRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts: prompt_parts
                .into_iter()
                .map(|text| GeminiPart { text: Some(text) })
                .collect(),
        }],
        generation_config: GenerationConfig {
            max_output_tokens: config.max_tokens,
            temperature: if config.temperature > 0.0 {
                Some(config.temperature)
            } else {
                None
            },
            thinking_config: ThinkingConfig { thinking_budget: 0 },
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> Result<String> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| QueryGraphError::LlmParse("Gemini: response has no candidates".into()))?;

    Ok(content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join(""))
}

impl Reasoner for GeminiReasoner {
    fn generate(&self, prompt_parts: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| QueryGraphError::Config("Gemini: api_key is required".into()))?;

            let body = build_request(&self.config, prompt_parts);

            let response = self
                .http
                .post(self.endpoint(api_key))
                .header("content-type", "application/json")
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

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| QueryGraphError::LlmParse(e.to_string()))?;

            let text = extract_text(parsed)?;
            debug!(model = %self.config.model_id, chars = text.len(), "Gemini reply received");
            Ok(text)
        })
    }
}
