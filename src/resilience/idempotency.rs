//! At-most-once execution per idempotency key.
//!
//! [`IdempotencyTracker::execute`] coalesces concurrent calls that share a
//! key into a single execution and keeps successful results for a short
//! TTL, so late duplicates get the stored result instead of running the
//! operation again. Failures are never stored: the next call with the same
//! key starts a fresh attempt.
//!
//! Built on moka's `try_get_with`, which provides both halves: the
//! in-flight map (waiters on a pending key are parked on the same init
//! future) and the TTL-bound completed map.
//!
//! # Keys
//!
//! [`generate_key`] mixes the current time into the digest and therefore
//! yields a fresh key per call. It never deduplicates anything on its own.
//! Callers that need real deduplication across retries should derive keys
//! with [`stable_key`] or supply their own.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use moka::future::Cache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::telemetry;
use crate::{HeimdallError, Result};

/// Idempotency tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// How long a completed result is served for its key. Default: 60s.
    pub ttl: Duration,
    /// Maximum completed results kept. Default: 10,000.
    pub max_entries: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_entries: 10_000,
        }
    }
}

impl IdempotencyConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long completed results are kept.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the maximum number of completed results kept.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }
}

/// Deduplicates executions keyed by an idempotency key.
pub struct IdempotencyTracker<T> {
    completed: Cache<String, T>,
}

impl<T> IdempotencyTracker<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a tracker with the given configuration.
    pub fn new(config: &IdempotencyConfig) -> Self {
        let completed = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { completed }
    }

    /// Run `f` at most once for `key` within the TTL window.
    ///
    /// - a stored result for `key` is returned without calling `f`
    /// - if another call for `key` is in flight, this call waits for and
    ///   returns that call's outcome (success or error)
    /// - otherwise `f` runs; a success is stored, an error is not
    pub async fn execute<F, Fut>(&self, key: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = key.into();
        let ran = AtomicBool::new(false);

        let outcome = self
            .completed
            .try_get_with(key.clone(), async {
                ran.store(true, Ordering::Relaxed);
                f().await
            })
            .await;

        if !ran.load(Ordering::Relaxed) {
            metrics::counter!(telemetry::IDEMPOTENCY_REUSED_TOTAL).increment(1);
            debug!(key = %key, "idempotent call answered by an earlier execution");
        }

        outcome.map_err(|e: Arc<HeimdallError>| Arc::unwrap_or_clone(e))
    }

    /// Whether a completed result is currently stored for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.completed.contains_key(key)
    }

    /// Number of completed results stored.
    pub async fn len(&self) -> u64 {
        self.completed.run_pending_tasks().await;
        self.completed.entry_count()
    }

    /// Whether no completed results are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop all completed results. In-flight executions are unaffected.
    pub fn clear(&self) {
        self.completed.invalidate_all();
    }
}

impl<T> Default for IdempotencyTracker<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(&IdempotencyConfig::default())
    }
}

/// Derive a key from an operation name, its arguments and the current time.
///
/// Every call returns a different key. Use [`stable_key`] when repeated
/// calls must map to the same key.
pub fn generate_key<A: Serialize + ?Sized>(operation: &str, args: &A) -> Result<String> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
    digest(operation, args, Some((nanos, counter)))
}

/// Derive a key from an operation name and its arguments only.
///
/// Equal inputs always produce equal keys.
pub fn stable_key<A: Serialize + ?Sized>(operation: &str, args: &A) -> Result<String> {
    digest(operation, args, None)
}

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

fn digest<A: Serialize + ?Sized>(
    operation: &str,
    args: &A,
    salt: Option<(u128, u64)>,
) -> Result<String> {
    let args = serde_json::to_vec(args)?;
    let mut hasher = Sha256::new();
    hasher.update((operation.len() as u64).to_le_bytes());
    hasher.update(operation.as_bytes());
    hasher.update((args.len() as u64).to_le_bytes());
    hasher.update(&args);
    if let Some((nanos, counter)) = salt {
        hasher.update(nanos.to_le_bytes());
        hasher.update(counter.to_le_bytes());
    }
    Ok(format!("{operation}:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique() {
        let a = generate_key("chat", &["hello"]).unwrap();
        let b = generate_key("chat", &["hello"]).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("chat:"));
    }

    #[test]
    fn stable_keys_repeat() {
        let a = stable_key("chat", &["hello"]).unwrap();
        let b = stable_key("chat", &["hello"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, stable_key("chat", &["world"]).unwrap());
        assert_ne!(a, stable_key("embed", &["hello"]).unwrap());
    }
}
