//! Metrics Store Port
//!
//! Defines the interface for recording per-method request metrics.

use std::time::Duration;

/// Store for request counters and latency observations.
///
/// This is an outbound port fed by the instrumenting layer of every
/// pipeline. It only observes; it never affects a call's outcome.
pub trait MetricsStore: Send + Sync {
    /// Count one request for `method`.
    fn increment_requests(&self, method: &str);

    /// Record how long a request to `method` took and whether it succeeded.
    fn observe_latency(&self, method: &str, success: bool, elapsed: Duration);

    /// Total requests counted for `method`.
    fn request_count(&self, method: &str) -> u64;
}
