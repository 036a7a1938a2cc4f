//! Backend trait: the raw chat-completion call the resilience layers wrap.
//!
//! A backend performs exactly one request per call and reports failures as
//! [`HeimdallError`](crate::HeimdallError) variants that keep their identity
//! (status code, retry hint) so the retry executor and the caller can
//! classify them. Backends never retry, cache or rate-limit on their own.
//!
//! Decorators such as [`RetryingBackend`](super::retry::RetryingBackend)
//! implement the same trait and can be stacked.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::types::{ChatResponse, LlmConfig, Message};

/// A chat-completion endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Send the conversation and return the first choice.
    async fn chat(&self, messages: &[Message], config: &LlmConfig) -> Result<ChatResponse>;
}

#[async_trait]
impl<B: ChatBackend + ?Sized> ChatBackend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn chat(&self, messages: &[Message], config: &LlmConfig) -> Result<ChatResponse> {
        (**self).chat(messages, config).await
    }
}
