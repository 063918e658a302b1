//! Observability infrastructure for the recommendation engine
//!
//! Prometheus metrics registered once behind a `OnceLock`; the scanner
//! exposes them on its `/metrics` endpoint.

use prometheus::{register_histogram, register_int_gauge, Histogram, IntGauge};
use std::sync::OnceLock;

/// Histogram buckets for per-resource pipeline latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    resource_latency_seconds: Histogram,
    recommendations_produced: IntGauge,
    resources_failed: IntGauge,
    resources_insufficient: IntGauge,
    history_rows_written: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            resource_latency_seconds: register_histogram!(
                "rightsizer_resource_latency_seconds",
                "Time spent producing one resource's recommendation",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register resource_latency_seconds"),

            recommendations_produced: register_int_gauge!(
                "rightsizer_recommendations_produced_total",
                "Total number of recommendation records produced"
            )
            .expect("Failed to register recommendations_produced"),

            resources_failed: register_int_gauge!(
                "rightsizer_resources_failed_total",
                "Total number of resources that ended in an ERROR record"
            )
            .expect("Failed to register resources_failed"),

            resources_insufficient: register_int_gauge!(
                "rightsizer_resources_insufficient_total",
                "Total number of resources skipped for insufficient coverage"
            )
            .expect("Failed to register resources_insufficient"),

            history_rows_written: register_int_gauge!(
                "rightsizer_history_rows_written_total",
                "Total number of history rows created or updated"
            )
            .expect("Failed to register history_rows_written"),
        }
    }
}

/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone, Default)]
pub struct EngineMetrics {
    _private: (),
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &'static EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_resource_latency(&self, seconds: f64) {
        self.inner().resource_latency_seconds.observe(seconds);
    }

    pub fn inc_recommendations(&self) {
        self.inner().recommendations_produced.inc();
    }

    pub fn inc_failed(&self) {
        self.inner().resources_failed.inc();
    }

    pub fn inc_insufficient(&self) {
        self.inner().resources_insufficient.inc();
    }

    pub fn inc_history_rows(&self, count: u64) {
        self.inner().history_rows_written.add(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration_is_idempotent() {
        let a = EngineMetrics::new();
        let b = EngineMetrics::new();
        a.inc_recommendations();
        b.inc_recommendations();
        a.observe_resource_latency(0.01);
        b.inc_history_rows(2);
    }
}
