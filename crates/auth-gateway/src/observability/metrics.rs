//! Metrics definitions for the authentication gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gateway_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 3 values (success, error, timeout)
//! - `result`: 3 values (hit, miss, stale)
//! - `outcome`: "success" plus the fixed set of diagnostic codes
//!
//! Key IDs, subjects and URLs are never used as label values.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a key-set refresh attempt
///
/// Metric: `gateway_jwks_refresh_total`, `gateway_jwks_refresh_duration_seconds`
/// Labels: `status`
pub fn record_jwks_refresh(status: &str, duration: Duration) {
    histogram!("gateway_jwks_refresh_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gateway_jwks_refresh_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a key lookup against the cached set
///
/// Metric: `gateway_jwks_cache_lookups_total`
/// Labels: `result` (hit, miss, stale)
pub fn record_jwks_cache_lookup(result: &str) {
    counter!("gateway_jwks_cache_lookups_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// Set the number of keys in the current set
///
/// Metric: `gateway_jwks_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_jwks_key_count(count: usize) {
    gauge!("gateway_jwks_keys").set(count as f64);
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record an `authenticate` call
///
/// Metric: `gateway_auth_total`, `gateway_auth_duration_seconds`
/// Labels: `outcome` ("success" or a diagnostic code)
pub fn record_authentication(outcome: &'static str, duration: Duration) {
    histogram!("gateway_auth_duration_seconds",
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    counter!("gateway_auth_total",
        "outcome" => outcome
    )
    .increment(1);
}
