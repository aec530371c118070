//! Tracing and telemetry instrumentation for sluice.
//!
//! This module provides helper functions for creating tracing spans and recording
//! metrics during a run. All functions work both with and without the `metrics`
//! feature flag.
//!
//! # Spans
//!
//! - `sluice.run` - one per engine run (info)
//! - `sluice.partition` - one per partition drawn by a worker (debug)
//! - `sluice.item` - one per executed item (trace)
//!
//! # Example
//!
//! ```ignore
//! use sluice::telemetry::{record_item_start, record_item_end};
//!
//! let handle = record_item_start(index);
//! // ... item execution
//! record_item_end(handle, "success");
//! ```

use tracing::{Span, debug_span, info_span, trace_span};

use crate::config::DispatchMode;
use crate::gate::{RunId, RunSummary};
use crate::partition::Partition;

/// Create the span covering a whole run.
///
/// # Arguments
/// * `run_id` - The run identifier
/// * `total_items` - Size of the index range
/// * `max_concurrency` - Slot cap for the run
/// * `mode` - Item dispatch mode
#[must_use]
pub fn run_span(
    run_id: RunId,
    total_items: u64,
    max_concurrency: usize,
    mode: DispatchMode,
) -> Span {
    info_span!(
        "sluice.run",
        run_id = %run_id,
        total_items = total_items,
        max_concurrency = max_concurrency,
        mode = ?mode,
    )
}

/// Create the span for one partition processed by one worker.
#[must_use]
pub fn partition_span(worker_id: impl AsRef<str>, partition: Partition) -> Span {
    debug_span!(
        "sluice.partition",
        worker_id = %worker_id.as_ref(),
        start = partition.start,
        end = partition.end,
    )
}

/// Create the span for one item execution.
#[must_use]
pub fn item_span(index: u64) -> Span {
    trace_span!("sluice.item", index = index)
}

/// Record a failed item. Every failure is logged on its own.
///
/// # Arguments
/// * `index` - The failed item's index
/// * `error` - Rendered error
/// * `panicked` - Whether the item function panicked
pub fn record_item_failed(index: u64, error: impl AsRef<str>, panicked: bool) {
    tracing::warn!(
        index = index,
        panicked = panicked,
        error = %error.as_ref(),
        "item failed"
    );
}

/// Record an item reaching its outcome.
///
/// # Arguments
/// * `status` - The outcome label (success, failure, panicked)
pub fn record_item_completed(status: impl AsRef<str>) {
    tracing::trace!(status = %status.as_ref(), "item completed");

    #[cfg(feature = "metrics")]
    crate::metrics::record_item_completed(status.as_ref());
}

/// Update the in-flight gauge and slot utilization.
///
/// # Arguments
/// * `in_flight` - Items currently holding a slot
/// * `limit` - Slot cap
pub fn set_slot_utilization(in_flight: usize, limit: usize) {
    let utilization = if limit == 0 {
        0.0
    } else {
        in_flight as f64 * 100.0 / limit as f64
    };
    tracing::trace!(
        in_flight = in_flight,
        limit = limit,
        utilization = utilization,
        "slot utilization updated"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::set_slot_utilization(in_flight as f64, utilization);
}

/// Observe the duration of one item execution.
///
/// # Arguments
/// * `status` - The outcome label
/// * `duration_secs` - The duration in seconds
pub fn observe_item_duration(status: impl AsRef<str>, duration_secs: f64) {
    tracing::trace!(
        status = %status.as_ref(),
        duration_secs = duration_secs,
        "item duration observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_item_duration(status.as_ref(), duration_secs);
}

/// Record the terminal summary of a run.
pub fn record_run_finished(summary: &RunSummary) {
    tracing::info!(
        run_id = %summary.run_id,
        status = %summary.status,
        total = summary.total,
        success_count = summary.success_count,
        failure_count = summary.failure_count,
        partitions_drawn = summary.partitions_drawn,
        peak_in_flight = summary.peak_in_flight,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_finished(summary.status.as_str());
}

/// Record a run torn down by a fatal error.
pub fn record_run_aborted(run_id: RunId, error: &crate::error::EngineError) {
    tracing::error!(run_id = %run_id, error = %error, "run aborted");

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_finished("aborted");
}

/// Record the start of an item execution for duration tracking.
///
/// Returns an opaque handle that should be passed to `record_item_end`.
pub fn record_item_start(index: u64) -> ItemTimingHandle {
    ItemTimingHandle {
        index,
        start: std::time::Instant::now(),
    }
}

/// Record the end of an item execution and update duration metrics.
///
/// # Arguments
/// * `handle` - The timing handle from `record_item_start`
/// * `status` - The outcome label
pub fn record_item_end(handle: ItemTimingHandle, status: impl AsRef<str>) {
    let duration_secs = handle.start.elapsed().as_secs_f64();
    observe_item_duration(status.as_ref(), duration_secs);
    record_item_completed(status);
}

/// Handle for tracking item execution duration.
///
/// This is an opaque type returned by `record_item_start` and consumed by
/// `record_item_end`.
#[derive(Debug)]
pub struct ItemTimingHandle {
    index: u64,
    start: std::time::Instant,
}

impl ItemTimingHandle {
    /// Get the item index associated with this timing handle.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Get the elapsed time since the item started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span() {
        let span = run_span(RunId::new(), 10, 2, DispatchMode::Horizontal);
        // Spans are disabled without a subscriber; metadata is only present
        // when one is installed.
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "sluice.run");
        }
    }

    #[test]
    fn test_partition_and_item_spans() {
        let _ = partition_span("w0", Partition::new(0, 3));
        let _ = item_span(2);
    }

    #[test]
    fn test_slot_utilization_handles_zero_limit() {
        set_slot_utilization(0, 0);
        set_slot_utilization(2, 4);
    }

    #[test]
    fn test_timing_handle() {
        let handle = record_item_start(42);
        assert_eq!(handle.index(), 42);

        // Sleep a tiny bit to ensure duration > 0
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(handle.elapsed().as_nanos() > 0);

        // record_item_end should not panic
        record_item_end(handle, "success");
    }
}
