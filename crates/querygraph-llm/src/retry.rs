use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use querygraph_core::config::RetryConfig;
use querygraph_core::error::{QueryGraphError, Result};
use querygraph_core::traits::Reasoner;

/// A reasoner that retries failed requests and falls back to alternative models.
pub struct RetryingReasoner {
    primary: Box<dyn Reasoner>,
    fallbacks: Vec<(String, Box<dyn Reasoner>)>,
    retry_config: RetryConfig,
}

impl RetryingReasoner {
    /// `fallbacks` pairs a model label (for logs) with its reasoner.
    pub fn new(
        primary: Box<dyn Reasoner>,
        fallbacks: Vec<(String, Box<dyn Reasoner>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &QueryGraphError) -> bool {
    match e {
        QueryGraphError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl Reasoner for RetryingReasoner {
    fn generate(&self, prompt_parts: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.generate(prompt_parts.clone()).await {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (label, reasoner) in &self.fallbacks {
                match reasoner.generate(prompt_parts.clone()).await {
                    Ok(text) => {
                        info!(model = %label, "Fell back to alternative model");
                        return Ok(text);
                    }
                    Err(e) => {
                        warn!(model = %label, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err
                .unwrap_or_else(|| QueryGraphError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        failures_left: AtomicUsize,
        calls: Arc<AtomicUsize>,
        error: &'static str,
    }

    impl Reasoner for Flaky {
        fn generate(&self, _parts: Vec<String>) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.failures_left.load(Ordering::SeqCst) > 0 {
                    self.failures_left.fetch_sub(1, Ordering::SeqCst);
                    return Err(QueryGraphError::LlmRequest(self.error.into()));
                }
                Ok("ok".into())
            })
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let primary = Flaky {
            failures_left: AtomicUsize::new(2),
            calls: calls.clone(),
            error: "HTTP 503: overloaded",
        };
        let client = RetryingReasoner::new(Box::new(primary), vec![], fast_retry());
        assert_eq!(client.generate(vec!["q".into()]).await.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_goes_to_fallback() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let primary = Flaky {
            failures_left: AtomicUsize::new(10),
            calls: primary_calls.clone(),
            error: "HTTP 401: bad key",
        };
        let fallback = Flaky {
            failures_left: AtomicUsize::new(0),
            calls: Arc::new(AtomicUsize::new(0)),
            error: "",
        };
        let client = RetryingReasoner::new(
            Box::new(primary),
            vec![("backup".into(), Box::new(fallback))],
            fast_retry(),
        );
        assert_eq!(client.generate(vec!["q".into()]).await.unwrap(), "ok");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_fail_returns_last_error() {
        let primary = Flaky {
            failures_left: AtomicUsize::new(10),
            calls: Arc::new(AtomicUsize::new(0)),
            error: "HTTP 401: bad key",
        };
        let client = RetryingReasoner::new(Box::new(primary), vec![], fast_retry());
        let err = client.generate(vec!["q".into()]).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(4800));
    }
}
