//! Heimdall - resilience layer for LLM API calls
//!
//! Wraps a chat-completion backend in the layers a production client
//! needs, applied in this order:
//!
//! 1. [`PromptCache`] answers repeated prompts from memory
//! 2. [`RateLimiter`] bounds the outbound request rate (token bucket)
//! 3. [`CircuitBreaker`] fails fast while the backend keeps failing
//! 4. [`with_retry`] retries transient failures with exponential backoff
//!
//! [`IdempotencyTracker`] additionally collapses duplicate submissions of
//! the same logical operation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use heimdall::{
//!     LlmConfig, Message, OpenAiCompatBackend, RateLimiterConfig, ResilientClient, RetryConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let client = ResilientClient::builder()
//!         .backend(OpenAiCompatBackend::new("http://localhost:8080")?.api_key("sk-your-key"))
//!         .rate_limiter(RateLimiterConfig::new().max_tokens(5))
//!         .retry(RetryConfig::new().max_attempts(4))
//!         .acquire_timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let reply = client
//!         .chat(
//!             &[
//!                 Message::system("You are a helpful assistant."),
//!                 Message::user("What is the capital of France?"),
//!             ],
//!             &LlmConfig::new().temperature(0.0),
//!         )
//!         .await?;
//!
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

pub mod cache;
#[cfg(feature = "config")]
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod resilience;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use error::{HeimdallError, Result};
pub use gateway::{ClientStats, ResilientClient, ResilientClientBuilder};

pub use cache::{CacheConfig, CacheEntry, CacheStats, PromptCache, cache_key};
#[cfg(feature = "config")]
pub use config::HeimdallConfig;
pub use providers::{ChatBackend, OpenAiCompatBackend, RetryConfig, RetryingBackend, with_retry};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
    IdempotencyConfig, IdempotencyTracker, RateLimiter, RateLimiterConfig, RateLimiterSnapshot,
    generate_key, stable_key,
};
pub use types::{ChatResponse, LlmConfig, Message, Role, TokenUsage};
