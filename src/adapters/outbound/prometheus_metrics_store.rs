//! Prometheus Metrics Store
//!
//! Implements MetricsStore with Prometheus metrics exposition.

use crate::domain::ports::MetricsStore;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Latency accumulator for one (method, success) label pair.
#[derive(Debug, Default)]
pub struct LatencyMetrics {
    /// Sum of observed latencies in microseconds
    pub sum_micros: AtomicU64,
    /// Number of observations
    pub count: AtomicU64,
}

impl LatencyMetrics {
    /// Average latency in microseconds.
    pub fn avg_micros(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum_micros.load(Ordering::Relaxed) as f64 / count as f64
    }
}

/// Prometheus-compatible metrics store.
///
/// Metric names are prefixed `<namespace>_<subsystem>_`.
pub struct PrometheusMetricsStore {
    namespace: String,
    subsystem: String,
    /// Request counters by method
    requests: DashMap<String, Arc<AtomicU64>>,
    /// Latency by (method, success)
    latency: DashMap<(String, bool), Arc<LatencyMetrics>>,
}

impl PrometheusMetricsStore {
    /// Create a new Prometheus metrics store.
    pub fn new(namespace: impl Into<String>, subsystem: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            requests: DashMap::new(),
            latency: DashMap::new(),
        }
    }

    fn metric(&self, name: &str) -> String {
        format!("{}_{}_{}", self.namespace, self.subsystem, name)
    }

    /// Get latency metrics for a label pair.
    pub fn get_latency(&self, method: &str, success: bool) -> Option<Arc<LatencyMetrics>> {
        self.latency
            .get(&(method.to_string(), success))
            .map(|e| e.clone())
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let count_name = self.metric("request_count");
        output.push_str(&format!("# HELP {} Number of requests received.\n", count_name));
        output.push_str(&format!("# TYPE {} counter\n", count_name));

        let mut requests: Vec<_> = self
            .requests
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        requests.sort();
        for (method, count) in requests {
            output.push_str(&format!("{}{{method=\"{}\"}} {}\n", count_name, method, count));
        }

        let latency_name = self.metric("request_latency_seconds");
        output.push_str(&format!(
            "# HELP {} Total duration of requests in seconds.\n",
            latency_name
        ));
        output.push_str(&format!("# TYPE {} summary\n", latency_name));

        let mut latency: Vec<_> = self
            .latency
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        latency.sort_by(|a, b| a.0.cmp(&b.0));
        for ((method, success), metrics) in latency {
            let labels = format!("method=\"{}\",success=\"{}\"", method, success);
            output.push_str(&format!(
                "{}_sum{{{}}} {:.6}\n",
                latency_name,
                labels,
                metrics.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
            ));
            output.push_str(&format!(
                "{}_count{{{}}} {}\n",
                latency_name,
                labels,
                metrics.count.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for PrometheusMetricsStore {
    fn default() -> Self {
        Self::new("rental", "service")
    }
}

impl MetricsStore for PrometheusMetricsStore {
    fn increment_requests(&self, method: &str) {
        self.requests
            .entry(method.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn observe_latency(&self, method: &str, success: bool, elapsed: Duration) {
        let metrics = self
            .latency
            .entry((method.to_string(), success))
            .or_insert_with(|| Arc::new(LatencyMetrics::default()))
            .clone();
        metrics
            .sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        metrics.count.fetch_add(1, Ordering::Relaxed);
    }

    fn request_count(&self, method: &str) -> u64 {
        self.requests
            .get(method)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
