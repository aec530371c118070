//! Sluice - bounded-concurrency partitioned execution.
//!
//! Runs one caller-supplied function over every index of a finite range
//! `[0, N)`, carving the range into partitions, dispatching them to a pool of
//! worker routines, and capping how many items execute at once.
//!
//! # Core Concepts
//!
//! - **Partition**: A half-open index range `[start, end)`. Partitions come
//!   from a [`PartitionSource`]: [`StaticSchedule`] pre-assigns them
//!   round-robin, [`DynamicPartitioner`] hands them out on demand.
//!
//! - **Slots**: [`ExecutionSlots`] is the global cap on items in flight. Each
//!   executing item holds one [`SlotPermit`], released when it finishes.
//!
//! - **Outcomes**: Every index ends with exactly one [`Outcome`], either a
//!   value or an [`ItemFailure`]. A failing item never affects its siblings.
//!
//! - **Completion**: The [`CompletionGate`] resolves a run exactly once,
//!   as `Completed`, `Cancelled`, or `TimedOut`, and produces the
//!   [`RunSummary`].
//!
//! - **Engine**: [`Engine`] ties the pieces together and returns a
//!   [`RunReport`].
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use sluice::*;
//!
//! let engine = Engine::new(EngineConfig::new(1_000, 8, 64))?;
//! let report = engine.run(fn_worker(|i| Ok(i as f64 * std::f64::consts::PI))).await?;
//! assert!(report.summary.is_clean());
//! ```

/// Write-once outcome storage.
///
/// The `collector` module provides [`ResultCollector`], a pre-sized table
/// with one write-once cell per index.
pub mod collector;

/// Run configuration.
///
/// The `config` module defines [`EngineConfig`] together with the
/// [`PartitionPolicy`] and [`DispatchMode`] choices.
pub mod config;

/// Error types.
pub mod error;

/// Run status, completion detection, and summaries.
///
/// The `gate` module provides:
/// - [`CompletionGate`] - exactly-once run resolution
/// - [`RunStatus`] - terminal states of a run
/// - [`RunSummary`] - counts, timings, and the first error of a run
/// - [`RunId`] - unique run identifier
pub mod gate;

#[cfg(feature = "metrics")]
/// Prometheus metrics for runs and items.
pub mod metrics;

/// Per-item outcomes.
pub mod outcome;

/// Index range partitioning.
///
/// The `partition` module provides [`Partition`], the [`PartitionSource`]
/// trait, and the static and dynamic partitioners.
pub mod partition;

/// Engine, builder, cancellation, and worker routines.
pub mod runtime;

/// Global execution slot cap.
pub mod slots;

/// Tracing spans and metric helpers.
pub mod telemetry;

/// The item function seam and its adapters.
///
/// The `worker_fn` module defines the [`ItemWorker`] trait and ready-made
/// adapters for sync, blocking, async, and slice-backed item functions.
pub mod worker_fn;

pub use collector::*;
pub use config::*;
pub use error::*;
pub use gate::*;
pub use outcome::*;
pub use partition::*;
pub use runtime::*;
pub use slots::*;
pub use worker_fn::*;
