//! Observability for the sync loop
//!
//! Provides:
//! - Prometheus metrics (sync latency, tracked objects, stored samples)
//! - Structured event logging with tracing

use crate::controller::SyncReport;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge_vec, Histogram, IntCounter,
    IntGaugeVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

const SYNC_LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<DashboardMetricsInner> = OnceLock::new();

struct DashboardMetricsInner {
    sync_latency_seconds: Histogram,
    sync_errors: IntCounter,
    tracked_objects: IntGaugeVec,
    samples_stored: IntCounter,
    samples_pruned: IntCounter,
}

impl DashboardMetricsInner {
    fn new() -> Self {
        Self {
            sync_latency_seconds: register_histogram!(
                "kdd_sync_latency_seconds",
                "Time spent on one collect and reconcile cycle",
                SYNC_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sync_latency_seconds"),

            sync_errors: register_int_counter!(
                "kdd_sync_errors_total",
                "Sync cycles that failed"
            )
            .expect("Failed to register sync_errors"),

            tracked_objects: register_int_gauge_vec!(
                "kdd_tracked_objects",
                "Objects stored by the last successful sync, per category",
                &["category"]
            )
            .expect("Failed to register tracked_objects"),

            samples_stored: register_int_counter!(
                "kdd_metric_samples_stored_total",
                "Container metric samples written"
            )
            .expect("Failed to register samples_stored"),

            samples_pruned: register_int_counter!(
                "kdd_metric_samples_pruned_total",
                "Container metric samples removed by retention"
            )
            .expect("Failed to register samples_pruned"),
        }
    }
}

/// Handle to the process-wide dashboard metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct DashboardMetrics {
    _private: (),
}

impl Default for DashboardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DashboardMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DashboardMetricsInner {
        GLOBAL_METRICS.get_or_init(DashboardMetricsInner::new)
    }

    pub fn observe_sync_latency(&self, elapsed: Duration) {
        self.inner()
            .sync_latency_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_sync_errors(&self) {
        self.inner().sync_errors.inc();
    }

    /// Set the tracked count for `namespaces`, `nodes` or `workloads`
    pub fn set_tracked(&self, category: &str, count: usize) {
        self.inner()
            .tracked_objects
            .with_label_values(&[category])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn add_samples(&self, stored: usize, pruned: usize) {
        let inner = self.inner();
        inner.samples_stored.inc_by(stored as u64);
        inner.samples_pruned.inc_by(pruned as u64);
    }
}

/// Emits `event = "..."` records for significant lifecycle moments
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_startup(&self, version: &str, sync_interval: Duration) {
        info!(
            event = "kdd_started",
            cluster = %self.cluster,
            version = %version,
            sync_interval_secs = sync_interval.as_secs(),
            "Workload dashboard started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "kdd_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "Workload dashboard shutting down"
        );
    }

    pub fn log_sync(&self, report: &SyncReport) {
        info!(
            event = "sync_completed",
            cluster = %self.cluster,
            namespaces = report.namespaces,
            nodes = report.nodes,
            workloads = report.workloads,
            samples = report.samples,
            pruned = report.pruned_samples,
            metrics_available = report.metrics_available,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Snapshot reconciled"
        );
    }

    pub fn log_sync_failure(&self, error: &dyn std::error::Error) {
        warn!(
            event = "sync_failed",
            cluster = %self.cluster,
            error = %error,
            "Sync cycle failed, keeping previous snapshot"
        );
    }
}
