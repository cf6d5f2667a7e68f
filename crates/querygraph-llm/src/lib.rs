pub mod providers;
pub mod retry;

use querygraph_core::config::{ModelConfig, RetryConfig};
use querygraph_core::traits::Reasoner;

pub use providers::{GeminiReasoner, OpenAiReasoner};
pub use retry::RetryingReasoner;

/// Create a reasoner based on the provider name.
pub fn create_reasoner(config: &ModelConfig) -> Box<dyn Reasoner> {
    match config.provider.as_str() {
        "gemini" | "google" => Box::new(GeminiReasoner::new(config.clone())),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiReasoner::new(config.clone())),
    }
}

/// Create the primary reasoner wrapped in retry and fallback handling when
/// either is configured.
pub fn create_reasoner_chain(primary: &ModelConfig, fallbacks: &[ModelConfig]) -> Box<dyn Reasoner> {
    let reasoner = create_reasoner(primary);
    if fallbacks.is_empty() && primary.retry.is_none() {
        return reasoner;
    }

    let fallbacks = fallbacks
        .iter()
        .map(|mc| (format!("{}/{}", mc.provider, mc.model_id), create_reasoner(mc)))
        .collect();
    let retry = primary.retry.clone().unwrap_or_else(RetryConfig::default);
    Box::new(RetryingReasoner::new(reasoner, fallbacks, retry))
}
