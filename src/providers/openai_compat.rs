//! Client for OpenAI-compatible chat-completion endpoints.
//!
//! Speaks `POST {base_url}/v1/chat/completions` as served by OpenAI, local
//! model servers (llama.cpp, vLLM, LM Studio, Ollama) and most gateways.
//! The request/response schema is consumed as-is; only the fields this
//! crate needs are modelled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::traits::ChatBackend;
use crate::types::{ChatResponse, LlmConfig, Message, TokenUsage};
use crate::{HeimdallError, Result};

/// Default base URL: a model server on localhost.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default per-request HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiCompatBackend {
    api_key: Option<String>,
    http: Client,
    base_url: String,
}

impl OpenAiCompatBackend {
    /// Create a client for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HeimdallError::Configuration(format!("HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        Ok(Self {
            api_key: None,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Base URL requests are sent to (without trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Map a non-2xx response to an error carrying its body text; 429 also
    /// keeps the Retry-After hint.
    async fn error_from_response(response: reqwest::Response) -> HeimdallError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let message = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));

        if status == 429 {
            HeimdallError::RateLimited {
                retry_after,
                message,
            }
        } else {
            HeimdallError::Api { status, message }
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn chat(&self, messages: &[Message], config: &LlmConfig) -> Result<ChatResponse> {
        let body = CompletionRequest {
            model: config.model.as_deref(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        trace!(url = %self.endpoint(), messages = messages.len(), "sending chat completion");

        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            debug!(error = %err, "chat completion failed");
            return Err(err);
        }

        let bytes = response.bytes().await?;
        let parsed: CompletionResponse = serde_json::from_slice(&bytes)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(HeimdallError::EmptyResponse)?;

        Ok(ChatResponse {
            content,
            model: parsed.model,
            usage: parsed.usage.map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
            }),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = OpenAiCompatBackend::new("http://localhost:1234/").unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn request_omits_unset_fields() {
        let messages = [Message::user("hi")];
        let body = CompletionRequest {
            model: None,
            messages: &messages,
            temperature: Some(0.0),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.0
            })
        );
    }
}
