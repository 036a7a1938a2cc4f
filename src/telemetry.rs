//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdall operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: operation name (e.g. "chat")
//! - `status`: outcome: "ok" or "error"
//! - `state`: circuit state entered: "closed", "open" or "half_open"

/// Total client calls that missed the cache, by outcome.
///
/// Calls rejected by an open circuit count as errors.
///
/// Labels: `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "heimdall_requests_total";

/// Backend request duration in seconds, including retries.
pub const REQUEST_DURATION_SECONDS: &str = "heimdall_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "heimdall_retries_total";

/// Total prompt cache hits.
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Total prompt cache misses (including expired entries).
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Time spent waiting for a rate limiter token, in seconds.
pub const RATE_LIMIT_WAIT_SECONDS: &str = "heimdall_rate_limit_wait_seconds";

/// Circuit breaker state transitions.
///
/// Labels: `state`.
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "heimdall_circuit_transitions_total";

/// Calls rejected by an open circuit.
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "heimdall_circuit_rejections_total";

/// Idempotent executions answered without running the operation again.
pub const IDEMPOTENCY_REUSED_TOTAL: &str = "heimdall_idempotency_reused_total";
