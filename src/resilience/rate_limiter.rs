//! Token-bucket rate limiting for outbound calls.
//!
//! The bucket holds up to `max_tokens` tokens and starts full, which allows
//! short bursts. Every whole `refill_interval` that elapses adds
//! `refill_rate` tokens. Refill is derived from elapsed time on each access
//! rather than from a background timer, so irregular call patterns are
//! handled without extra tasks. Partial intervals are carried over, never
//! rounded up.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::{HeimdallError, Result};

/// Rate limiter configuration.
///
/// ```rust
/// # use heimdall::RateLimiterConfig;
/// # use std::time::Duration;
/// let config = RateLimiterConfig::new()
///     .max_tokens(5)
///     .refill_rate(1)
///     .refill_interval(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Bucket capacity (burst size). Default: 10.
    pub max_tokens: u32,
    /// Tokens added per refill interval. Default: 1.
    pub refill_rate: u32,
    /// Length of one refill tick. Default: 1s.
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10,
            refill_rate: 1,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bucket capacity.
    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    /// Set the number of tokens added per interval.
    pub fn refill_rate(mut self, n: u32) -> Self {
        self.refill_rate = n;
        self
    }

    /// Set the refill tick length.
    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

/// Point-in-time view of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimiterSnapshot {
    pub tokens: f64,
    pub max_tokens: u32,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter.
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        let bucket = Bucket {
            tokens: f64::from(config.max_tokens),
            last_refill: Instant::now(),
        };
        Self {
            config,
            bucket: Mutex::new(bucket),
        }
    }

    /// Take one token if available.
    ///
    /// Never blocks and never drives the bucket below zero.
    pub fn try_acquire(&self) -> bool {
        self.poll_token().is_none()
    }

    /// Wait until a token is available and take it.
    ///
    /// Sleeps until the next refill boundary between attempts. Unbounded:
    /// use [`acquire_timeout()`](Self::acquire_timeout) when the caller
    /// needs a deadline.
    pub async fn acquire(&self) {
        let started = Instant::now();
        while let Some(wait) = self.poll_token() {
            debug!(
                wait_ms = wait.as_millis() as u64,
                "rate limiter empty, waiting for refill"
            );
            tokio::time::sleep(wait).await;
        }
        let waited = started.elapsed();
        if !waited.is_zero() {
            metrics::histogram!(telemetry::RATE_LIMIT_WAIT_SECONDS).record(waited.as_secs_f64());
        }
    }

    /// Like [`acquire()`](Self::acquire), but gives up after `timeout`.
    ///
    /// Returns [`HeimdallError::DeadlineExceeded`] without consuming a token
    /// when none became available in time.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| HeimdallError::DeadlineExceeded("waiting for a rate limiter token"))
    }

    /// Current and maximum token counts. Refills, never consumes.
    pub fn state(&self) -> RateLimiterSnapshot {
        let mut bucket = self.lock();
        self.refill(&mut bucket, Instant::now());
        RateLimiterSnapshot {
            tokens: bucket.tokens,
            max_tokens: self.config.max_tokens,
        }
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Take a token, or report how long until the next refill tick.
    fn poll_token(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return None;
        }

        let since_refill = now.duration_since(bucket.last_refill);
        let wait = self
            .config
            .refill_interval
            .saturating_sub(since_refill)
            .max(Duration::from_millis(1));
        Some(wait)
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let max = f64::from(self.config.max_tokens);
        let interval = self.config.refill_interval.as_nanos();
        if interval == 0 {
            bucket.tokens = max;
            bucket.last_refill = now;
            return;
        }

        let elapsed = now.duration_since(bucket.last_refill).as_nanos();
        let ticks = elapsed / interval;
        if ticks == 0 {
            return;
        }

        bucket.tokens = (bucket.tokens + ticks as f64 * f64::from(self.config.refill_rate)).min(max);
        // Advance by whole ticks only so the partial interval carries over.
        bucket.last_refill += Duration::from_nanos((ticks * interval) as u64);
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, rate: u32, interval_ms: u64) -> RateLimiter {
        RateLimiter::new(
            RateLimiterConfig::new()
                .max_tokens(max)
                .refill_rate(rate)
                .refill_interval(Duration::from_millis(interval_ms)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn starts_full() {
        let limiter = limiter(3, 1, 1000);
        assert_eq!(limiter.state().tokens, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_interval_carries_over() {
        let limiter = limiter(2, 1, 1000);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(!limiter.try_acquire());
        tokio::time::advance(Duration::from_millis(600)).await;
        // 1200ms elapsed in total: exactly one whole tick.
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(800)).await;
        // 2000ms since the first acquisition: second tick lands.
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_limits() {
        let limiter = limiter(1, 1, 0);
        for _ in 0..10 {
            assert!(limiter.try_acquire());
        }
    }
}
