//! Heimdall error types

use std::time::Duration;

use crate::providers::retry::DEFAULT_RETRYABLE_ERRORS;

/// Heimdall error types.
///
/// The enum is `Clone` so a single outcome can be handed to every caller
/// waiting on the same idempotency key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HeimdallError {
    // Backend/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited (429), retry after {retry_after:?}: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    // Resilience errors
    /// The circuit breaker is open and the call was rejected without
    /// reaching the backend.
    #[error("circuit open, next trial in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    /// A bounded wait (rate limiter acquisition, retry budget) ran out.
    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(&'static str),

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("empty response from backend")]
    EmptyResponse,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HeimdallError {
    /// Short machine-readable code for this error.
    ///
    /// HTTP failures report their status code; the rest report a stable
    /// snake_case tag. Retry classification matches against this code as
    /// well as the display message.
    pub fn code(&self) -> String {
        match self {
            Self::Http(_) => "connection".to_string(),
            Self::Timeout => "timeout".to_string(),
            Self::Api { status, .. } => status.to_string(),
            Self::RateLimited { .. } => "rate_limit".to_string(),
            Self::CircuitOpen { .. } => "circuit_open".to_string(),
            Self::DeadlineExceeded(_) => "deadline_exceeded".to_string(),
            Self::Json(_) => "json".to_string(),
            Self::EmptyResponse => "empty_response".to_string(),
            Self::Configuration(_) => "configuration".to_string(),
        }
    }

    /// Whether this error matches any of the given retryable patterns.
    ///
    /// A pattern matches when it equals [`code()`](Self::code) or occurs as
    /// a substring of the display message. Circuit-open and deadline errors
    /// never match: retrying them would defeat their purpose.
    pub fn matches_any<S: AsRef<str>>(&self, patterns: &[S]) -> bool {
        if matches!(self, Self::CircuitOpen { .. } | Self::DeadlineExceeded(_)) {
            return false;
        }
        let code = self.code();
        let message = self.to_string();
        patterns.iter().any(|p| {
            let p = p.as_ref();
            !p.is_empty() && (code == p || message.contains(p))
        })
    }

    /// Whether the default retry policy retries this error.
    ///
    /// Same classification as [`RetryConfig::default()`](crate::RetryConfig):
    /// a match against [`DEFAULT_RETRYABLE_ERRORS`].
    pub fn is_transient(&self) -> bool {
        self.matches_any(DEFAULT_RETRYABLE_ERRORS)
    }

    /// Whether the call was short-circuited by an open breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Backend-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HeimdallError {
    fn from(err: serde_json::Error) -> Self {
        HeimdallError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for HeimdallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            // Malformed URL or request: retrying cannot help.
            HeimdallError::Configuration(format!("invalid request: {err}"))
        } else if err.is_timeout() {
            HeimdallError::Timeout
        } else if err.is_decode() {
            HeimdallError::Json(err.to_string())
        } else {
            HeimdallError::Http(err.to_string())
        }
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
