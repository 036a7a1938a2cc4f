//! Circuit breaker guarding calls to a failing backend.
//!
//! # States
//!
//! - `Closed`: normal operation, calls pass through
//! - `Open`: backend assumed down, calls fail fast with
//!   [`HeimdallError::CircuitOpen`]
//! - `HalfOpen`: trial calls are let through to probe for recovery
//!
//! # Transitions
//!
//! ```text
//! Closed   → Open:     consecutive failures >= failure_threshold
//! Open     → HalfOpen: next call after reset_timeout has elapsed since the last failure
//! HalfOpen → Closed:   consecutive successes >= success_threshold
//! HalfOpen → Open:     any failure
//! ```
//!
//! The state lock is released while the wrapped call runs, so concurrent
//! calls in `HalfOpen` are all admitted as trials.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::telemetry;
use crate::{HeimdallError, Result};

/// Circuit breaker configuration.
///
/// ```rust
/// # use heimdall::CircuitBreakerConfig;
/// # use std::time::Duration;
/// let config = CircuitBreakerConfig::new()
///     .failure_threshold(3)
///     .reset_timeout(Duration::from_secs(10))
///     .success_threshold(1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. Default: 5.
    pub failure_threshold: u32,
    /// Cool-down after the last failure before a trial call. Default: 30s.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes that close the circuit. Default: 2.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Time since the last recorded failure, if any.
    #[serde(skip)]
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

impl Inner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
        }
    }
}

/// Three-state circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker in the `Closed` state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    /// Run `f` through the breaker.
    ///
    /// Fails with [`HeimdallError::CircuitOpen`] without calling `f` while
    /// the circuit is open and the cool-down has not elapsed. Otherwise
    /// `f`'s outcome is recorded and returned unchanged.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;

        let result = f().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(e) => self.on_failure(e),
        }
        result
    }

    /// Current state and counters.
    pub fn state(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Force the breaker closed and clear all counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(from = inner.state.label(), "circuit breaker manually reset");
        }
        *inner = Inner::closed();
    }

    /// The configuration this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn admit(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let since_failure = inner
            .last_failure
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX);

        if since_failure > self.config.reset_timeout {
            inner.consecutive_successes = 0;
            transition(&mut inner, CircuitState::HalfOpen);
            Ok(())
        } else {
            metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL).increment(1);
            Err(HeimdallError::CircuitOpen {
                retry_in: self.config.reset_timeout - since_failure,
            })
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                inner.consecutive_successes = 0;
                transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self, error: &HeimdallError) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());

        let reopen = inner.state == CircuitState::HalfOpen;
        let tripped = inner.consecutive_failures >= self.config.failure_threshold;
        if inner.state != CircuitState::Open && (reopen || tripped) {
            warn!(
                failures = inner.consecutive_failures,
                threshold = self.config.failure_threshold,
                error = %error,
                "circuit breaker opening"
            );
            inner.consecutive_successes = 0;
            transition(&mut inner, CircuitState::Open);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

fn transition(inner: &mut Inner, to: CircuitState) {
    if inner.state == to {
        return;
    }
    info!(from = inner.state.label(), to = to.label(), "circuit breaker state change");
    metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL, "state" => to.label()).increment(1);
    inner.state = to;
}
