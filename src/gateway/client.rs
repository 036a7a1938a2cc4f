//! ResilientClient - composes the resilience layers around a backend

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::builder::ResilientClientBuilder;
use crate::cache::{CacheStats, PromptCache};
use crate::providers::{ChatBackend, RetryingBackend};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerSnapshot, IdempotencyTracker, RateLimiter, RateLimiterSnapshot,
};
use crate::types::{ChatResponse, LlmConfig, Message};
use crate::{Result, telemetry};

/// Client that routes every chat call through cache, rate limiter,
/// circuit breaker and retry, in that order.
///
/// The stateful layers are held as `Arc`s; clients built with the same
/// shared component observe each other's effects on it.
pub struct ResilientClient {
    cache: Arc<PromptCache>,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: Arc<CircuitBreaker>,
    backend: RetryingBackend,
    acquire_timeout: Option<Duration>,
    idempotency: IdempotencyTracker<String>,
    default_model: Option<String>,
}

/// Point-in-time view of a client's components.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub cache: CacheStats,
    pub rate_limiter: RateLimiterSnapshot,
    pub circuit_breaker: CircuitBreakerSnapshot,
}

impl ResilientClient {
    /// Create a new builder.
    pub fn builder() -> ResilientClientBuilder {
        ResilientClientBuilder::new()
    }

    pub(crate) fn from_parts(
        cache: Arc<PromptCache>,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
        backend: RetryingBackend,
        acquire_timeout: Option<Duration>,
        idempotency: IdempotencyTracker<String>,
        default_model: Option<String>,
    ) -> Self {
        Self {
            cache,
            rate_limiter,
            circuit_breaker,
            backend,
            acquire_timeout,
            idempotency,
            default_model,
        }
    }

    /// Build a client from a loaded configuration file.
    #[cfg(feature = "config")]
    pub fn from_config(config: &crate::config::HeimdallConfig) -> Result<Self> {
        ResilientClientBuilder::from_config(config)?.build()
    }

    /// Send a conversation and return the assistant's reply.
    ///
    /// A fresh cached reply is returned without touching any other layer.
    /// Otherwise the call waits for a rate limiter token, passes the
    /// circuit breaker and runs the retrying backend call; a successful
    /// reply is cached. Errors are returned unchanged and never cached.
    ///
    /// When `config.model` is unset the client's default model, if any, is
    /// requested instead and is part of the cache key.
    #[instrument(name = "heimdall.chat", skip_all, fields(messages = messages.len()))]
    pub async fn chat(&self, messages: &[Message], config: &LlmConfig) -> Result<String> {
        let resolved = self.resolve_config(config);
        let config: &LlmConfig = &resolved;

        if let Some(entry) = self.cache.get(messages, config) {
            return Ok(entry.content);
        }

        match self.acquire_timeout {
            Some(timeout) => self.rate_limiter.acquire_timeout(timeout).await?,
            None => self.rate_limiter.acquire().await,
        }

        let started = Instant::now();
        let outcome = self
            .circuit_breaker
            .execute(|| self.backend.chat(messages, config))
            .await;
        record_request(&outcome, started.elapsed());

        let response = outcome?;
        self.cache.set(messages, config, &response);
        Ok(response.content)
    }

    /// [`chat()`](Self::chat) at most once per `key` within the
    /// idempotency TTL.
    ///
    /// Concurrent calls with the same key share one execution; a completed
    /// success is replayed to later callers. Failures are not remembered.
    pub async fn chat_idempotent(
        &self,
        key: impl Into<String>,
        messages: &[Message],
        config: &LlmConfig,
    ) -> Result<String> {
        self.idempotency
            .execute(key, || self.chat(messages, config))
            .await
    }

    /// Snapshot of cache, rate limiter and circuit breaker state.
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            cache: self.cache.stats(),
            rate_limiter: self.rate_limiter.state(),
            circuit_breaker: self.circuit_breaker.state(),
        }
    }

    pub fn cache(&self) -> &Arc<PromptCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn idempotency(&self) -> &IdempotencyTracker<String> {
        &self.idempotency
    }

    /// Name of the wrapped backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Model requested when a call does not name one.
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    fn resolve_config<'a>(&self, config: &'a LlmConfig) -> Cow<'a, LlmConfig> {
        match (&config.model, &self.default_model) {
            (None, Some(model)) => Cow::Owned(config.clone().model(model.clone())),
            _ => Cow::Borrowed(config),
        }
    }
}

fn record_request(outcome: &Result<ChatResponse>, elapsed: Duration) {
    let status = if outcome.is_ok() { "ok" } else { "error" };
    metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => status).increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());

    match outcome {
        Ok(response) => debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            model = response.model.as_deref().unwrap_or("-"),
            "backend call succeeded"
        ),
        Err(e) => debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            error = %e,
            "backend call failed"
        ),
    }
}
