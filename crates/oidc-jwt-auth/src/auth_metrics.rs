//! Authenticator metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `jwt_auth_attempts_total` - Counter for authentication attempts (labels: outcome)
//! - `jwt_auth_key_refreshes_total` - Counter for JWKS refreshes (labels: status)
//! - `jwt_auth_verification_duration_seconds` - Histogram for token verification duration
//!
//! `outcome` is `success`, `no_token`, `backend_failure`, or the
//! [`RejectReason::kind`](crate::RejectReason::kind) of the rejection.
//!
//! ## Example
//!
//! ```rust,ignore
//! use oidc_jwt_auth::init_auth_metrics;
//!
//! // Initialize metric descriptions once at startup
//! init_auth_metrics();
//! ```

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize authenticator metric descriptions. Call once at startup.
///
/// Idempotent; only the first call registers the descriptions.
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "jwt_auth_attempts_total",
            "Total JWT authentication attempts by outcome"
        );
        describe_counter!(
            "jwt_auth_key_refreshes_total",
            "Total JWKS refreshes by status"
        );
        describe_histogram!(
            "jwt_auth_verification_duration_seconds",
            "Token verification duration in seconds"
        );
    });
}

/// Record an authentication attempt
#[cfg(feature = "metrics")]
pub(crate) fn record_auth_attempt(outcome: &'static str) {
    counter!("jwt_auth_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a JWKS refresh (`success`, `failure`, `rate_limited`)
#[cfg(feature = "metrics")]
pub(crate) fn record_key_refresh(status: &'static str) {
    counter!("jwt_auth_key_refreshes_total", "status" => status).increment(1);
}

/// Record token verification duration
#[cfg(feature = "metrics")]
pub(crate) fn record_verification_duration(duration_seconds: f64) {
    histogram!("jwt_auth_verification_duration_seconds").record(duration_seconds);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_auth_attempt(_outcome: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_key_refresh(_status: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_verification_duration(_duration_seconds: f64) {}
