//! Content-addressed prompt cache with per-read TTL expiry.
//!
//! [`PromptCache`] maps a `(messages, config)` pair to the response a
//! backend produced for it, so identical cost-incurring calls inside the
//! TTL window are answered locally.
//!
//! # Expiry
//!
//! Entries are checked against the TTL when they are read. There is no
//! background sweep: an expired entry that is never read again stays in the
//! map until it is overwritten, evicted by the `max_entries` bound, or the
//! cache is cleared.
//!
//! # Keys
//!
//! See [`cache_key`]. Keys depend only on the serialized content of the
//! messages and config, never on object identity.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::types::{ChatResponse, LlmConfig, Message, TokenUsage};

/// Configuration for the prompt cache.
///
/// ```rust
/// # use heimdall::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A cached backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub content: String,
    /// When the entry was stored.
    pub timestamp: Instant,
    pub tokens: Option<TokenUsage>,
}

impl CacheEntry {
    /// Time elapsed since the entry was stored.
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Snapshot of the cache contents for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// In-memory prompt cache.
pub struct PromptCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl PromptCache {
    /// Create a new prompt cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: config.ttl,
            max_entries: config.max_entries.max(1),
        }
    }

    /// Create a cache with the default capacity and the given TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(&CacheConfig::default().ttl(ttl))
    }

    /// Look up the cached response for a conversation.
    ///
    /// Returns `None` on a miss. An entry older than the TTL is removed and
    /// reported as a miss.
    pub fn get(&self, messages: &[Message], config: &LlmConfig) -> Option<CacheEntry> {
        let key = cache_key(messages, config);
        let mut entries = self.lock();

        let expired = entries
            .get(&key)
            .map(|entry| entry.timestamp.elapsed() > self.ttl);

        match expired {
            Some(false) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                debug!(key = %short(&key), "prompt cache hit");
                entries.get(&key).cloned()
            }
            Some(true) => {
                entries.remove(&key);
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                debug!(key = %short(&key), "prompt cache entry expired, removed");
                None
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Store (or overwrite) the response for a conversation.
    pub fn set(&self, messages: &[Message], config: &LlmConfig, response: &ChatResponse) {
        let key = cache_key(messages, config);
        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| now.duration_since(entry.timestamp) <= self.ttl);
            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.timestamp)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        entries.remove(&k);
                    }
                    None => break,
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                content: response.content.clone(),
                timestamp: now,
                tokens: response.usage,
            },
        );
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Current size and keys.
    ///
    /// Expired entries that have not been read yet are still counted.
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: entries.len(),
            keys,
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // The map is left consistent by every critical section.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// Compute the cache key for a conversation and its config.
///
/// SHA-256 over a canonical, length-prefixed encoding of every message
/// (role, content) in order, followed by the config fields in declaration
/// order. Returned as lowercase hex.
pub fn cache_key(messages: &[Message], config: &LlmConfig) -> String {
    let mut hasher = Sha256::new();

    hasher.update((messages.len() as u64).to_le_bytes());
    for message in messages {
        update_field(&mut hasher, message.role.as_str().as_bytes());
        update_field(&mut hasher, message.content.as_bytes());
    }

    match config.temperature {
        Some(t) => {
            hasher.update([1u8]);
            hasher.update(t.to_bits().to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    match config.max_tokens {
        Some(n) => {
            hasher.update([1u8]);
            hasher.update(n.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    match &config.model {
        Some(model) => {
            hasher.update([1u8]);
            update_field(&mut hasher, model.as_bytes());
        }
        None => hasher.update([0u8]),
    }

    format!("{:x}", hasher.finalize())
}

/// Length-prefixed so that `("ab", "c")` and `("a", "bc")` never collide.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn short(key: &str) -> &str {
    &key[..8.min(key.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convo(text: &str) -> Vec<Message> {
        vec![Message::system("be brief"), Message::user(text)]
    }

    #[test]
    fn cache_key_deterministic() {
        let config = LlmConfig::new().temperature(0.0);
        assert_eq!(
            cache_key(&convo("hello"), &config),
            cache_key(&convo("hello"), &config)
        );
    }

    #[test]
    fn cache_key_is_hex_sha256() {
        let key = cache_key(&convo("hello"), &LlmConfig::default());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cache_key_differs_on_content_whitespace() {
        let config = LlmConfig::default();
        assert_ne!(
            cache_key(&convo("hello"), &config),
            cache_key(&convo("hello "), &config)
        );
    }

    #[test]
    fn cache_key_differs_on_role() {
        let config = LlmConfig::default();
        assert_ne!(
            cache_key(&[Message::user("x")], &config),
            cache_key(&[Message::assistant("x")], &config)
        );
    }

    #[test]
    fn cache_key_message_order_matters() {
        let config = LlmConfig::default();
        let a = vec![Message::user("one"), Message::user("two")];
        let b = vec![Message::user("two"), Message::user("one")];
        assert_ne!(cache_key(&a, &config), cache_key(&b, &config));
    }

    #[test]
    fn cache_key_no_boundary_collision() {
        let config = LlmConfig::default();
        let a = vec![Message::user("ab"), Message::user("c")];
        let b = vec![Message::user("a"), Message::user("bc")];
        assert_ne!(cache_key(&a, &config), cache_key(&b, &config));
    }

    #[test]
    fn cache_key_differs_on_each_config_field() {
        let messages = convo("hello");
        let base = cache_key(&messages, &LlmConfig::default());
        assert_ne!(base, cache_key(&messages, &LlmConfig::new().temperature(0.0)));
        assert_ne!(base, cache_key(&messages, &LlmConfig::new().max_tokens(0)));
        assert_ne!(base, cache_key(&messages, &LlmConfig::new().model("")));
        assert_ne!(
            cache_key(&messages, &LlmConfig::new().temperature(0.1)),
            cache_key(&messages, &LlmConfig::new().temperature(0.2))
        );
    }

    #[test]
    fn eviction_drops_oldest_when_full() {
        let cache = PromptCache::new(&CacheConfig::new().max_entries(2));
        let config = LlmConfig::default();
        cache.set(&convo("a"), &config, &ChatResponse::text("A"));
        cache.set(&convo("b"), &config, &ChatResponse::text("B"));
        cache.set(&convo("c"), &config, &ChatResponse::text("C"));

        assert_eq!(cache.stats().size, 2);
        assert!(cache.get(&convo("c"), &config).is_some());
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = PromptCache::new(&CacheConfig::new().max_entries(2));
        let config = LlmConfig::default();
        cache.set(&convo("a"), &config, &ChatResponse::text("A"));
        cache.set(&convo("b"), &config, &ChatResponse::text("B"));
        cache.set(&convo("b"), &config, &ChatResponse::text("B2"));

        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get(&convo("b"), &config).unwrap().content, "B2");
        assert!(cache.get(&convo("a"), &config).is_some());
    }
}
