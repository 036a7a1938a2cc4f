//! Caching subsystem.
//!
//! - [`prompt::PromptCache`]: TTL-bound cache of backend responses keyed
//!   on the conversation and its [`LlmConfig`](crate::LlmConfig). Consulted
//!   first by [`ResilientClient::chat()`](crate::ResilientClient::chat); a
//!   hit bypasses rate limiting, the circuit breaker and the backend.

pub mod prompt;

pub use prompt::{CacheConfig, CacheEntry, CacheStats, PromptCache, cache_key};
