//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. explicit path (`--config <path>`)
//! 2. `~/.heimdall/config.toml` (user)
//! 3. built-in defaults
//!
//! Every section and key is optional. The API key is never stored in the
//! file: `backend.api_key_env` names the environment variable holding it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::providers::openai_compat::{DEFAULT_BASE_URL, OpenAiCompatBackend};
use crate::providers::retry::DEFAULT_RETRYABLE_ERRORS;
use crate::providers::RetryConfig;
use crate::resilience::{CircuitBreakerConfig, IdempotencyConfig, RateLimiterConfig};
use crate::{HeimdallError, Result};

/// Default environment variable holding the backend API key.
pub const DEFAULT_API_KEY_ENV: &str = "HEIMDALL_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeimdallConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub idempotency: IdempotencySection,
}

/// Backend endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    /// Base URL of the OpenAI-compatible server (default: http://localhost:8080).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key (default: HEIMDALL_API_KEY).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-request HTTP timeout in seconds (default: 60).
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Model requested when the caller does not name one.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_request_timeout(),
            model: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// Prompt cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Maximum stored replies (default: 10000).
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
    /// Entry lifetime in seconds (default: 3600).
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_entries() -> usize {
    10_000
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Token bucket settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// Bucket capacity (default: 10).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Tokens added per interval (default: 1).
    #[serde(default = "default_refill_rate")]
    pub refill_rate: u32,
    /// Refill interval in milliseconds (default: 1000).
    #[serde(default = "default_refill_interval")]
    pub refill_interval_ms: u64,
    /// Upper bound on waiting for a token, in milliseconds (default: wait forever).
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            refill_rate: default_refill_rate(),
            refill_interval_ms: default_refill_interval(),
            acquire_timeout_ms: None,
        }
    }
}

fn default_max_tokens() -> u32 {
    10
}

fn default_refill_rate() -> u32 {
    1
}

fn default_refill_interval() -> u64 {
    1000
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSection {
    /// Consecutive failures that open the circuit (default: 5).
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a trial call (default: 30).
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
    /// Trial successes that close the circuit (default: 2).
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    30
}

fn default_success_threshold() -> u32 {
    2
}

/// Retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Total attempts including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 1000).
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Cap on any single delay in milliseconds (default: 10000).
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Add random jitter to delays (default: true).
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    /// Error codes or message fragments worth retrying.
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
    /// Total retry budget in milliseconds (default: none).
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
            retryable_errors: default_retryable_errors(),
            deadline_ms: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_jitter() -> bool {
    true
}

fn default_retryable_errors() -> Vec<String> {
    DEFAULT_RETRYABLE_ERRORS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Idempotency tracker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencySection {
    /// How long a completed result is replayed, in seconds (default: 60).
    #[serde(default = "default_idempotency_ttl")]
    pub ttl_secs: u64,
    /// Maximum remembered results (default: 10000).
    #[serde(default = "default_idempotency_entries")]
    pub max_entries: u64,
}

impl Default for IdempotencySection {
    fn default() -> Self {
        Self {
            ttl_secs: default_idempotency_ttl(),
            max_entries: default_idempotency_entries(),
        }
    }
}

fn default_idempotency_ttl() -> u64 {
    60
}

fn default_idempotency_entries() -> u64 {
    10_000
}

impl HeimdallConfig {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the user file is used if
    /// present and built-in defaults otherwise. The result is validated.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    HeimdallError::Configuration(format!(
                        "Failed to read config file {path:?}: {e}"
                    ))
                })?;
                toml::from_str(&content).map_err(|e| {
                    HeimdallError::Configuration(format!(
                        "Failed to parse config file {path:?}: {e}"
                    ))
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (not validated).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            HeimdallError::Configuration(format!("Failed to parse config: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HeimdallError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        let user_config = dirs::home_dir().map(|home| home.join(".heimdall").join("config.toml"));
        Ok(user_config.filter(|path| path.exists()))
    }

    /// Reject settings no component can work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(HeimdallError::Configuration(msg.to_string()));

        if self.backend.base_url.trim().is_empty() {
            return invalid("backend.base_url must not be empty");
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be at least 1");
        }
        if self.rate_limit.max_tokens == 0 {
            return invalid("rate_limit.max_tokens must be at least 1");
        }
        if self.rate_limit.refill_rate == 0 {
            return invalid("rate_limit.refill_rate must be at least 1");
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return invalid("circuit_breaker.failure_threshold must be at least 1");
        }
        if self.circuit_breaker.success_threshold == 0 {
            return invalid("circuit_breaker.success_threshold must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        Ok(())
    }

    /// API key from the environment variable named by `backend.api_key_env`.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.backend.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    /// Build the configured HTTP backend.
    pub fn backend(&self) -> Result<OpenAiCompatBackend> {
        let backend = OpenAiCompatBackend::with_timeout(
            &self.backend.base_url,
            Duration::from_secs(self.backend.timeout_secs),
        )?;
        Ok(match self.api_key() {
            Some(key) => backend.api_key(key),
            None => backend,
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.cache.max_entries)
            .ttl(Duration::from_secs(self.cache.ttl_secs))
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new()
            .max_tokens(self.rate_limit.max_tokens)
            .refill_rate(self.rate_limit.refill_rate)
            .refill_interval(Duration::from_millis(self.rate_limit.refill_interval_ms))
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.rate_limit.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .failure_threshold(self.circuit_breaker.failure_threshold)
            .reset_timeout(Duration::from_secs(self.circuit_breaker.reset_timeout_secs))
            .success_threshold(self.circuit_breaker.success_threshold)
    }

    pub fn retry_config(&self) -> RetryConfig {
        let config = RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .jitter(self.retry.jitter)
            .retryable_errors(self.retry.retryable_errors.iter().cloned());
        match self.retry.deadline_ms {
            Some(ms) => config.deadline(Duration::from_millis(ms)),
            None => config,
        }
    }

    pub fn idempotency_config(&self) -> IdempotencyConfig {
        IdempotencyConfig::new()
            .ttl(Duration::from_secs(self.idempotency.ttl_secs))
            .max_entries(self.idempotency.max_entries)
    }
}
