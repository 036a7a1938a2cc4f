//! Stateful resilience components.
//!
//! Each component owns its state behind its own lock and is meant to be
//! constructed once and shared (usually through an `Arc`) by every call
//! made through one [`ResilientClient`](crate::ResilientClient).
//!
//! - [`RateLimiter`]: token bucket bounding outbound call rate
//! - [`CircuitBreaker`]: fails fast while the backend is down
//! - [`IdempotencyTracker`]: single-flight execution per key
//!
//! The stateless retry helper lives in [`providers::retry`](crate::providers::retry).

pub mod circuit_breaker;
pub mod idempotency;
pub mod rate_limiter;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use idempotency::{IdempotencyConfig, IdempotencyTracker, generate_key, stable_key};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
