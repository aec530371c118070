//! Prometheus metrics instrumentation for sluice.
//!
//! All metrics are conditionally compiled behind the `metrics` feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `sluice_items_total` - Items that reached an outcome, by status
//! - `sluice_runs_total` - Runs that reached a terminal state, by status
//!
//! ## Gauges
//! - `sluice_items_in_flight` - Items currently holding an execution slot
//! - `sluice_slot_utilization` - Slot utilization percentage
//!
//! ## Histograms
//! - `sluice_item_duration_seconds` - Item execution duration in seconds
#![cfg(feature = "metrics")]

use prometheus::{CounterVec, Gauge, HistogramVec, Opts, Registry, exponential_buckets};
use std::sync::LazyLock;

/// Global Prometheus registry for sluice metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for items that reached an outcome.
///
/// Labels:
/// - `status`: success, failure, panicked
pub static ITEMS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("sluice_items_total", "Items that reached an outcome");
    CounterVec::new(opts, &["status"]).expect("sluice_items_total metric creation failed")
});

/// Counter for finished runs.
///
/// Labels:
/// - `status`: completed, cancelled, timed_out, aborted
pub static RUNS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("sluice_runs_total", "Runs that reached a terminal state");
    CounterVec::new(opts, &["status"]).expect("sluice_runs_total metric creation failed")
});

/// Gauge for items currently executing.
pub static ITEMS_IN_FLIGHT: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("sluice_items_in_flight", "Items currently holding an execution slot")
        .expect("sluice_items_in_flight metric creation failed")
});

/// Gauge for slot utilization percentage.
pub static SLOT_UTILIZATION: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new(
        "sluice_slot_utilization",
        "Execution slot utilization percentage (0-100)",
    )
    .expect("sluice_slot_utilization metric creation failed")
});

/// Histogram for item execution duration in seconds.
///
/// Labels:
/// - `status`: success, failure, panicked
pub static ITEM_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.000_01, 2.0, 20).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "sluice_item_duration_seconds",
        "Item execution duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["status"])
        .expect("sluice_item_duration_seconds metric creation failed")
});

/// Initialize all metrics by registering them with the global registry.
///
/// This function is idempotent - calling it multiple times is safe.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(ITEMS_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(RUNS_TOTAL.clone()),
        Box::new(ITEMS_IN_FLIGHT.clone()),
        Box::new(SLOT_UTILIZATION.clone()),
        Box::new(ITEM_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Helper to record an item outcome.
pub fn record_item_completed(status: &str) {
    ITEMS_TOTAL.with_label_values(&[status]).inc();
}

/// Helper to record a finished run.
pub fn record_run_finished(status: &str) {
    RUNS_TOTAL.with_label_values(&[status]).inc();
}

/// Helper to update the in-flight and utilization gauges.
pub fn set_slot_utilization(in_flight: f64, utilization: f64) {
    ITEMS_IN_FLIGHT.set(in_flight);
    SLOT_UTILIZATION.set(utilization);
}

/// Helper to observe item duration.
pub fn observe_item_duration(status: &str, duration_secs: f64) {
    ITEM_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics().expect("metrics initialization should succeed");
        init_metrics().expect("second initialization should be a no-op");
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_item_completed("success");
        record_item_completed("failure");
        record_run_finished("completed");
        observe_item_duration("success", 0.002);
        set_slot_utilization(1.0, 50.0);

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("sluice_items_total"));
        assert!(output.contains("sluice_runs_total"));
        assert!(output.contains("sluice_item_duration_seconds"));
    }
}
