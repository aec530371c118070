//! Mock item workers for exercising sluice engines in tests.
//!
//! Every mock records what it was asked to do under a `parking_lot::Mutex`
//! so tests can assert on dispatch counts, duplicated indices, and observed
//! concurrency after a run.

mod gate;
mod mock;

pub use gate::{ConcurrencyProbe, GateWorker, SlowWorker};
pub use mock::{DispatchRecord, FailingWorker, PanickingWorker, RecordingWorker};
