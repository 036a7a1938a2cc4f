//! Chat backends and backend decorators.
//!
//! - [`traits::ChatBackend`]: the raw call every other layer wraps
//! - [`openai_compat::OpenAiCompatBackend`]: HTTP client for
//!   OpenAI-compatible chat-completion endpoints
//! - [`retry`]: retry executor and the [`RetryingBackend`] decorator

pub mod openai_compat;
pub mod retry;
pub mod traits;

pub use openai_compat::OpenAiCompatBackend;
pub use retry::{RetryConfig, RetryingBackend, with_retry};
pub use traits::ChatBackend;
