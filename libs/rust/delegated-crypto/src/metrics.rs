//! Metrics for remote block operations and queued tasks.

use once_cell::sync::Lazy;
use prometheus::{CounterVec, HistogramVec, register_counter_vec, register_histogram_vec};
use std::time::Duration;

static REMOTE_OPERATIONS: Lazy<Option<CounterVec>> = Lazy::new(|| {
    register_counter_vec!(
        "delegated_crypto_remote_operations_total",
        "Total remote block operations",
        &["engine", "status"]
    )
    .ok()
});

static REMOTE_LATENCY: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    register_histogram_vec!(
        "delegated_crypto_remote_latency_seconds",
        "Remote block operation round trip latency",
        &["engine"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .ok()
});

static QUEUE_TASKS: Lazy<Option<CounterVec>> = Lazy::new(|| {
    register_counter_vec!(
        "delegated_crypto_queue_tasks_total",
        "Queued tasks by kind and outcome",
        &["kind", "outcome"]
    )
    .ok()
});

static QUEUE_DISCARDED: Lazy<Option<CounterVec>> = Lazy::new(|| {
    register_counter_vec!(
        "delegated_crypto_queue_discarded_total",
        "Queued tasks discarded after a failed update",
        &["kind"]
    )
    .ok()
});

/// Metrics recorder. A disabled recorder is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct CryptoMetrics {
    enabled: bool,
}

impl CryptoMetrics {
    /// Create a recorder.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        if enabled {
            Lazy::force(&REMOTE_OPERATIONS);
            Lazy::force(&REMOTE_LATENCY);
            Lazy::force(&QUEUE_TASKS);
            Lazy::force(&QUEUE_DISCARDED);
        }
        Self { enabled }
    }

    /// Create a recorder that records nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Record one remote round trip.
    pub fn record_remote_operation(&self, engine: &str, status: &str, latency: Duration) {
        if !self.enabled {
            return;
        }
        if let Some(counter) = REMOTE_OPERATIONS.as_ref() {
            counter.with_label_values(&[engine, status]).inc();
        }
        if let Some(histogram) = REMOTE_LATENCY.as_ref() {
            histogram
                .with_label_values(&[engine])
                .observe(latency.as_secs_f64());
        }
    }

    /// Record a completed queue task.
    pub fn record_task(&self, kind: &str, outcome: &str) {
        if !self.enabled {
            return;
        }
        if let Some(counter) = QUEUE_TASKS.as_ref() {
            counter.with_label_values(&[kind, outcome]).inc();
        }
    }

    /// Record a task discarded by the failure cascade.
    pub fn record_discarded(&self, kind: &str) {
        if !self.enabled {
            return;
        }
        if let Some(counter) = QUEUE_DISCARDED.as_ref() {
            counter.with_label_values(&[kind]).inc();
        }
    }
}

impl Default for CryptoMetrics {
    fn default() -> Self {
        Self::new(true)
    }
}
