//! One budgeted call to the generation service.
//!
//! [`GenerationClient::generate`] runs the fixed sequence for every call:
//! estimate the prompt's cost, debit it from the model's shared
//! [`RateLimiter`], wait out the minimum interval, then call the service.
//!
//! Failures never propagate. A refused prompt ([`GenerationOutcome::Blocked`])
//! is retried a bounded number of times with exponential backoff; every other
//! failure is logged and becomes empty text. Callers decide what an empty
//! result means for them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{ModelsConfig, RetrySettings};
use crate::contract::{GenerationOutcome, GenerationService};
use crate::rate_limit::{RateLimiter, RateLimiterRegistry};

/// Which configured model a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKey {
    /// Posts, titles and secondary summaries.
    Content,
    /// Summaries of oversized diffs.
    Summary,
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKey::Content => f.write_str("content"),
            ModelKey::Summary => f.write_str("summary"),
        }
    }
}

/// Approximate token count: about four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// A single generation call, built per attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub estimated_cost: u64,
}

struct ModelRoute {
    model: String,
    limiter: Arc<RateLimiter>,
}

/// Shared handle; clones reuse the same service and limiters.
#[derive(Clone)]
pub struct GenerationClient {
    service: Arc<dyn GenerationService>,
    routes: Arc<HashMap<ModelKey, ModelRoute>>,
    retry: RetrySettings,
}

impl GenerationClient {
    /// Builds one route per model key; keys naming the same model share a limiter.
    pub fn new(
        service: Arc<dyn GenerationService>,
        models: &ModelsConfig,
        retry: RetrySettings,
    ) -> Self {
        let mut registry = RateLimiterRegistry::new();
        let mut routes = HashMap::new();
        for (key, settings) in [(ModelKey::Content, &models.content), (ModelKey::Summary, &models.summary)] {
            let limiter = registry.register(&settings.model, &settings.limits);
            routes.insert(
                key,
                ModelRoute {
                    model: settings.model.clone(),
                    limiter,
                },
            );
        }
        info!(
            content_model = %models.content.model,
            summary_model = %models.summary.model,
            limiters = registry.len(),
            "Generation client ready"
        );
        Self {
            service,
            routes: Arc::new(routes),
            retry,
        }
    }

    /// The limiter serving `key`.
    pub fn limiter(&self, key: ModelKey) -> Option<Arc<RateLimiter>> {
        self.routes.get(&key).map(|route| Arc::clone(&route.limiter))
    }

    /// Generates text for `prompt`, or returns an empty string on any failure.
    pub async fn generate(&self, key: ModelKey, prompt: &str) -> String {
        let Some(route) = self.routes.get(&key) else {
            error!(%key, "No model configured for key");
            return String::new();
        };

        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let request = GenerationRequest {
                model: &route.model,
                prompt,
                estimated_cost: self.service.estimate_cost(&route.model, prompt),
            };
            route.limiter.consume(request.estimated_cost).await;
            route.limiter.enforce_min_interval().await;

            debug!(%key, model = request.model, attempt, cost = request.estimated_cost, "Calling generation service");
            match self.service.generate(request.model, request.prompt).await {
                GenerationOutcome::Text(text) if !text.trim().is_empty() => return text,
                GenerationOutcome::Text(_) => {
                    warn!(%key, model = request.model, "Generation returned blank text");
                    return String::new();
                }
                GenerationOutcome::Blocked { reason } => {
                    if attempt == max_attempts {
                        warn!(%key, model = request.model, %reason, attempts = attempt, "Prompt still blocked, giving up");
                        return String::new();
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        %key,
                        model = request.model,
                        %reason,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Prompt blocked, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                GenerationOutcome::Stopped { reason, partial } => {
                    warn!(
                        %key,
                        model = request.model,
                        %reason,
                        partial_chars = partial.as_deref().map_or(0, str::len),
                        "Generation stopped early, discarding output"
                    );
                    return String::new();
                }
                GenerationOutcome::Malformed(detail) => {
                    warn!(%key, model = request.model, %detail, "Malformed generation response");
                    return String::new();
                }
                GenerationOutcome::Error(detail) => {
                    error!(%key, model = request.model, %detail, "Generation call failed");
                    return String::new();
                }
            }
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSettings;
    use crate::contract::MockGenerationService;
    use crate::rate_limit::RateLimitSettings;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn models() -> ModelsConfig {
        let limits = RateLimitSettings {
            capacity: 1_000,
            refill_per_minute: 1_000,
            requests_per_minute: 60,
        };
        ModelsConfig {
            content: ModelSettings {
                model: "content-model".into(),
                limits: limits.clone(),
            },
            summary: ModelSettings {
                model: "summary-model".into(),
                limits,
            },
        }
    }

    fn retry() -> RetrySettings {
        RetrySettings {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_text_and_debits_budget() {
        let mut service = MockGenerationService::new();
        service.expect_estimate_cost().returning(|_, _| 100);
        service
            .expect_generate()
            .withf(|model, _| model.to_string() == "content-model")
            .times(1)
            .returning(|_, _| GenerationOutcome::Text("hello".into()));

        let client = GenerationClient::new(Arc::new(service), &models(), retry());
        let text = client.generate(ModelKey::Content, "prompt").await;
        assert_eq!(text, "hello");

        let budget = client.limiter(ModelKey::Content).unwrap().snapshot().await;
        // One second of min-interval refilled ~16.7 units after the debit.
        assert!(budget.available < 1_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_is_retried_with_backoff_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut service = MockGenerationService::new();
        service.expect_estimate_cost().returning(|_, _| 1);
        let seen = Arc::clone(&calls);
        service.expect_generate().times(2).returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                GenerationOutcome::Blocked {
                    reason: "SAFETY".into(),
                }
            } else {
                GenerationOutcome::Text("ok".into())
            }
        });

        let client = GenerationClient::new(Arc::new(service), &models(), retry());
        let start = Instant::now();
        assert_eq!(client.generate(ModelKey::Content, "p").await, "ok");
        // interval + backoff(1) + interval
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_every_time_gives_empty_after_max_attempts() {
        let mut service = MockGenerationService::new();
        service.expect_estimate_cost().returning(|_, _| 1);
        service.expect_generate().times(3).returning(|_, _| GenerationOutcome::Blocked {
            reason: "OTHER".into(),
        });

        let client = GenerationClient::new(Arc::new(service), &models(), retry());
        assert_eq!(client.generate(ModelKey::Summary, "p").await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_malformed_and_error_are_not_retried() {
        for outcome in [
            GenerationOutcome::Stopped {
                reason: "MAX_TOKENS".into(),
                partial: Some("half a po".into()),
            },
            GenerationOutcome::Malformed("no candidates".into()),
            GenerationOutcome::Error("connection reset".into()),
            GenerationOutcome::Text("   ".into()),
        ] {
            let mut service = MockGenerationService::new();
            service.expect_estimate_cost().returning(|_, _| 1);
            service
                .expect_generate()
                .times(1)
                .returning(move |_, _| outcome.clone());
            let client = GenerationClient::new(Arc::new(service), &models(), retry());
            assert_eq!(client.generate(ModelKey::Content, "p").await, "");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_respect_min_interval() {
        let stamps = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut service = MockGenerationService::new();
        service.expect_estimate_cost().returning(|_, _| 1);
        let seen = Arc::clone(&stamps);
        service.expect_generate().returning(move |_, _| {
            seen.lock().unwrap().push(Instant::now());
            GenerationOutcome::Text("x".into())
        });

        let client = GenerationClient::new(Arc::new(service), &models(), retry());
        client.generate(ModelKey::Content, "a").await;
        client.generate(ModelKey::Content, "b").await;

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[1] - stamps[0] >= Duration::from_secs(1));
    }

    #[test]
    fn keys_with_same_model_share_limiter() {
        let mut config = models();
        config.summary.model = "content-model".into();
        let client = GenerationClient::new(Arc::new(MockGenerationService::new()), &config, retry());
        let a = client.limiter(ModelKey::Content).unwrap();
        let b = client.limiter(ModelKey::Summary).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
