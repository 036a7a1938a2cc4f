//! Builder for configuring client instances

use std::sync::Arc;
use std::time::Duration;

use super::ResilientClient;
use crate::cache::{CacheConfig, PromptCache};
use crate::providers::{ChatBackend, RetryConfig, RetryingBackend};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, IdempotencyConfig, IdempotencyTracker, RateLimiter,
    RateLimiterConfig,
};
use crate::{HeimdallError, Result};

/// Builder for [`ResilientClient`].
///
/// Each stateful layer can be configured (a fresh instance is created) or
/// supplied as a shared `Arc` so several clients use one instance.
/// Only the backend is required.
pub struct ResilientClientBuilder {
    backend: Option<Arc<dyn ChatBackend>>,
    cache: Option<Arc<PromptCache>>,
    cache_config: CacheConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    rate_limiter_config: RateLimiterConfig,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    circuit_breaker_config: CircuitBreakerConfig,
    retry: RetryConfig,
    acquire_timeout: Option<Duration>,
    idempotency: IdempotencyConfig,
    default_model: Option<String>,
}

impl ResilientClientBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            cache: None,
            cache_config: CacheConfig::default(),
            rate_limiter: None,
            rate_limiter_config: RateLimiterConfig::default(),
            circuit_breaker: None,
            circuit_breaker_config: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            acquire_timeout: None,
            idempotency: IdempotencyConfig::default(),
            default_model: None,
        }
    }

    /// Seed a builder from a loaded configuration file.
    ///
    /// The backend is an [`OpenAiCompatBackend`](crate::providers::OpenAiCompatBackend)
    /// pointed at `backend.base_url`, and `backend.model` becomes the
    /// default model. Further builder calls override individual settings.
    #[cfg(feature = "config")]
    pub fn from_config(config: &crate::config::HeimdallConfig) -> Result<Self> {
        Ok(Self::new()
            .backend(config.backend()?)
            .cache(config.cache_config())
            .rate_limiter(config.rate_limiter_config())
            .circuit_breaker(config.circuit_breaker_config())
            .retry(config.retry_config())
            .idempotency(config.idempotency_config())
            .acquire_timeout_opt(config.acquire_timeout())
            .default_model_opt(config.backend.model.clone()))
    }

    /// Set the backend the resilience layers wrap.
    pub fn backend(mut self, backend: impl ChatBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Set an already shared backend.
    pub fn shared_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Configure a fresh prompt cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self.cache = None;
        self
    }

    /// Use a cache shared with other clients.
    pub fn shared_cache(mut self, cache: Arc<PromptCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Configure a fresh rate limiter.
    pub fn rate_limiter(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limiter_config = config;
        self.rate_limiter = None;
        self
    }

    /// Use a rate limiter shared with other clients.
    pub fn shared_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Configure a fresh circuit breaker.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker_config = config;
        self.circuit_breaker = None;
        self
    }

    /// Use a circuit breaker shared with other clients.
    pub fn shared_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Set the retry policy for backend calls.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Bound the wait for a rate limiter token (default: wait indefinitely).
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    #[cfg(feature = "config")]
    fn acquire_timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Model requested for calls whose [`LlmConfig`](crate::LlmConfig)
    /// leaves `model` unset.
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    #[cfg(feature = "config")]
    fn default_model_opt(mut self, model: Option<String>) -> Self {
        self.default_model = model;
        self
    }

    /// Configure the tracker used by
    /// [`chat_idempotent()`](ResilientClient::chat_idempotent).
    pub fn idempotency(mut self, config: IdempotencyConfig) -> Self {
        self.idempotency = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ResilientClient> {
        let backend = self
            .backend
            .ok_or_else(|| HeimdallError::Configuration("no backend configured".into()))?;

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(PromptCache::new(&self.cache_config)));
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.rate_limiter_config)));
        let circuit_breaker = self
            .circuit_breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(self.circuit_breaker_config)));

        Ok(ResilientClient::from_parts(
            cache,
            rate_limiter,
            circuit_breaker,
            RetryingBackend::new(backend, self.retry),
            self.acquire_timeout,
            IdempotencyTracker::new(&self.idempotency),
            self.default_model,
        ))
    }
}

impl Default for ResilientClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
