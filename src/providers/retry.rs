//! Retry configuration, delay calculation, and the retrying backend decorator.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour, the shared
//! [`with_retry()`] executor, and [`RetryingBackend`], which wraps any
//! [`ChatBackend`] with automatic retry on errors classified as retryable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;
use tracing::warn;

use crate::telemetry;

use super::traits::ChatBackend;
use crate::types::{ChatResponse, LlmConfig, Message};
use crate::{HeimdallError, Result};

/// Error patterns retried by default.
///
/// Matched against [`HeimdallError::code()`] and the error's display text.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] =
    &["connection", "timeout", "rate_limit", "429", "500", "503"];

/// Share of the exponential term that may be added as random jitter.
const JITTER_FACTOR: f64 = 0.3;

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use heimdall::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(200))
///     .jitter(true);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 1s.
    pub base_delay: Duration,
    /// Upper bound on any single delay. Default: 10s.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays. Default: true.
    pub jitter: bool,
    /// Patterns marking an error as retryable. Default: [`DEFAULT_RETRYABLE_ERRORS`].
    pub retryable_errors: Vec<String>,
    /// Total time budget measured from the first attempt. When the next
    /// delay would overrun it, the executor stops with
    /// [`HeimdallError::DeadlineExceeded`]. Default: none.
    pub deadline: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: true,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            deadline: None,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Replace the retryable error patterns.
    pub fn retryable_errors<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Bound the total time spent retrying.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether `error` matches one of the configured patterns.
    pub fn is_retryable(&self, error: &HeimdallError) -> bool {
        error.matches_any(&self.retryable_errors)
    }

    /// Backoff before retrying after failed attempt number `attempt` (1-based).
    ///
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`. Does NOT include
    /// jitter; see [`effective_delay()`](Self::effective_delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.exponential(attempt).min(self.max_delay)
    }

    /// Full delay after failed attempt number `attempt` (1-based).
    ///
    /// Adds up to 30% of the exponential term as jitter when enabled. A
    /// backend `retry_after` hint replaces the computed value. Either way
    /// the result never exceeds `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = match retry_after {
            Some(hint) => hint,
            None => {
                let exponential = self.exponential(attempt);
                if self.jitter {
                    let share = rand::thread_rng().gen_range(0.0..JITTER_FACTOR);
                    exponential.saturating_add(exponential.mul_f64(share))
                } else {
                    exponential
                }
            }
        };
        delay.min(self.max_delay)
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an async operation with retry logic.
///
/// Retries errors matching `config.retryable_errors` up to
/// `config.max_attempts`, sleeping [`RetryConfig::effective_delay()`]
/// between attempts. Non-retryable errors, and the error from the final
/// attempt, are returned verbatim without delay.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match f().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if attempt >= max_attempts || !config.is_retryable(&err) {
            return Err(err);
        }

        let delay = config.effective_delay(attempt, err.retry_after());
        if let Some(deadline) = config.deadline
            && started.elapsed().saturating_add(delay) > deadline
        {
            warn!(
                operation,
                attempt,
                deadline_ms = deadline.as_millis() as u64,
                error = %err,
                "retry budget exhausted"
            );
            return Err(HeimdallError::DeadlineExceeded("retrying a failed request"));
        }

        metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
            .increment(1);
        warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient error"
        );
        tokio::time::sleep(delay).await;
    }
}

// ============================================================================
// RetryingBackend
// ============================================================================

/// Decorator that wraps a [`ChatBackend`] with retry logic.
///
/// Errors matching the config's retryable patterns are retried with
/// exponential backoff up to `config.max_attempts`; everything else is
/// returned immediately.
pub struct RetryingBackend {
    inner: Arc<dyn ChatBackend>,
    config: RetryConfig,
}

impl RetryingBackend {
    /// Wrap a backend with retry logic.
    pub fn new(inner: Arc<dyn ChatBackend>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The retry configuration in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl ChatBackend for RetryingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, messages: &[Message], config: &LlmConfig) -> Result<ChatResponse> {
        with_retry(&self.config, "chat", || self.inner.chat(messages, config)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_thirty_percent() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_millis(1000))
            .max_delay(Duration::from_secs(60));
        for _ in 0..200 {
            let delay = config.effective_delay(1, None);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(1300));
        }
    }

    #[test]
    fn jittered_delay_never_exceeds_max() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_millis(900))
            .max_delay(Duration::from_secs(1));
        for attempt in 1..20 {
            assert!(config.effective_delay(attempt, None) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let config = RetryConfig::new().max_delay(Duration::from_secs(2));
        assert_eq!(
            config.effective_delay(1, Some(Duration::from_secs(30))),
            Duration::from_secs(2)
        );
        assert_eq!(
            config.effective_delay(1, Some(Duration::from_millis(500))),
            Duration::from_millis(500)
        );
    }
}
