use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::outcome::ItemFailure;

/// Unique identifier of one engine run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a run. Every state but `Running` is terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunStatus {
    Running = 0,
    Completed = 1,
    Cancelled = 2,
    TimedOut = 3,
}

impl RunStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Completed,
            2 => Self::Cancelled,
            3 => Self::TimedOut,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal report of one run. Built once after every in-flight item has
/// drained; never mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    pub total: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub partitions_total: u64,
    pub partitions_drawn: u64,
    /// Worker routines spawned for this run.
    pub workers: usize,
    /// Highest number of this run's items executing at once.
    pub peak_in_flight: usize,
    pub first_error: Option<ItemFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Outcomes recorded, successful or not.
    pub fn recorded(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Completed with no failed items.
    pub fn is_clean(&self) -> bool {
        self.is_completed() && self.failure_count == 0
    }
}

/// Partition accounting the gate cannot observe itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct PartitionStats {
    pub partitions_total: u64,
    pub partitions_drawn: u64,
    pub workers: usize,
    pub peak_in_flight: usize,
}

/// Folds per-item outcomes into a single terminal signal.
///
/// The state byte moves from `Running` to exactly one terminal state via
/// compare-exchange, so the gate resolves once no matter how many recorders,
/// cancellations, and timeouts race.
pub struct CompletionGate {
    run_id: RunId,
    items_total: u64,
    state: AtomicU8,
    recorded: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    first_error: Mutex<Option<ItemFailure>>,
    notify: Notify,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl fmt::Debug for CompletionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGate")
            .field("run_id", &self.run_id)
            .field("items_total", &self.items_total)
            .field("state", &self.state())
            .field("recorded", &self.recorded())
            .finish_non_exhaustive()
    }
}

impl CompletionGate {
    pub fn new(run_id: RunId, items_total: u64) -> Self {
        let gate = Self {
            run_id,
            items_total,
            state: AtomicU8::new(RunStatus::Running as u8),
            recorded: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            first_error: Mutex::new(None),
            notify: Notify::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        };
        if items_total == 0 {
            gate.try_resolve(RunStatus::Completed);
        }
        gate
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn items_total(&self) -> u64 {
        self.items_total
    }

    pub fn state(&self) -> RunStatus {
        RunStatus::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Acquire)
    }

    /// Count one successful item. Returns `true` if this resolved the gate.
    pub fn record_success(&self) -> bool {
        self.succeeded.fetch_add(1, Ordering::AcqRel);
        self.bump()
    }

    /// Count one failed item, keeping the earliest failure for diagnostics.
    /// Returns `true` if this resolved the gate.
    pub fn record_failure(&self, failure: ItemFailure) -> bool {
        self.failed.fetch_add(1, Ordering::AcqRel);
        {
            let mut first = self.first_error.lock();
            if first.is_none() {
                *first = Some(failure);
            }
        }
        self.bump()
    }

    fn bump(&self) -> bool {
        let now = self.recorded.fetch_add(1, Ordering::AcqRel) + 1;
        now == self.items_total && self.try_resolve(RunStatus::Completed)
    }

    /// Move to a terminal state if still running. `Completed` is refused
    /// unless every item has been recorded.
    pub fn try_resolve(&self, status: RunStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }
        if status == RunStatus::Completed && self.recorded() != self.items_total {
            return false;
        }
        let won = self
            .state
            .compare_exchange(
                RunStatus::Running as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            tracing::debug!(run_id = %self.run_id, status = %status, "completion gate resolved");
            self.notify.notify_waiters();
        }
        won
    }

    /// Wait until the gate reaches a terminal state.
    pub async fn resolved(&self) -> RunStatus {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let state = self.state();
            if state.is_terminal() {
                return state;
            }
            notified.await;
        }
    }

    /// Resolve a run whose workers all exited. Normally already `Completed`;
    /// a source that ran dry before covering every index ends `Cancelled`.
    pub fn finish(&self) -> RunStatus {
        if !self.try_resolve(RunStatus::Completed) && self.state() == RunStatus::Running {
            tracing::warn!(
                run_id = %self.run_id,
                recorded = self.recorded(),
                items_total = self.items_total,
                "partition source exhausted before every item was recorded"
            );
            self.try_resolve(RunStatus::Cancelled);
        }
        self.state()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Build the terminal summary from the current counters.
    pub fn summarize(&self, stats: PartitionStats) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            status: self.state(),
            total: self.items_total,
            success_count: self.succeeded.load(Ordering::Acquire),
            failure_count: self.failed.load(Ordering::Acquire),
            partitions_total: stats.partitions_total,
            partitions_drawn: stats.partitions_drawn,
            workers: stats.workers,
            peak_in_flight: stats.peak_in_flight,
            first_error: self.first_error.lock().clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed: self.started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_completes_when_all_recorded() {
        let gate = CompletionGate::new(RunId::new(), 3);
        assert!(!gate.record_success());
        assert!(!gate.record_failure(ItemFailure::new(1, "bad")));
        assert_eq!(gate.state(), RunStatus::Running);
        assert!(gate.record_success());
        assert_eq!(gate.state(), RunStatus::Completed);

        let summary = gate.summarize(PartitionStats::default());
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.recorded(), 3);
        assert_eq!(summary.first_error.map(|f| f.index), Some(1));
    }

    #[test]
    fn test_empty_run_completes_immediately() {
        let gate = CompletionGate::new(RunId::new(), 0);
        assert_eq!(gate.state(), RunStatus::Completed);
        assert!(gate.summarize(PartitionStats::default()).is_clean());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let gate = CompletionGate::new(RunId::new(), 2);
        gate.record_success();
        assert!(gate.try_resolve(RunStatus::Cancelled));
        assert!(!gate.try_resolve(RunStatus::TimedOut));

        // Late recordings still count but cannot flip the status.
        assert!(!gate.record_success());
        assert_eq!(gate.state(), RunStatus::Cancelled);
        assert_eq!(gate.recorded(), 2);
    }

    #[test]
    fn test_completed_requires_full_count() {
        let gate = CompletionGate::new(RunId::new(), 2);
        gate.record_success();
        assert!(!gate.try_resolve(RunStatus::Completed));
        assert!(!gate.try_resolve(RunStatus::Running));
        assert_eq!(gate.state(), RunStatus::Running);
    }

    #[test]
    fn test_first_error_is_kept() {
        let gate = CompletionGate::new(RunId::new(), 3);
        gate.record_failure(ItemFailure::new(2, "first"));
        gate.record_failure(ItemFailure::new(0, "second"));
        let summary = gate.summarize(PartitionStats::default());
        assert_eq!(summary.first_error.unwrap().message, "first");
    }

    #[test]
    fn test_finish_marks_short_run_cancelled() {
        let gate = CompletionGate::new(RunId::new(), 5);
        gate.record_success();
        assert_eq!(gate.finish(), RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_resolved_wakes_waiter() {
        let gate = Arc::new(CompletionGate::new(RunId::new(), 1));
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.resolved().await })
        };
        tokio::task::yield_now().await;
        gate.record_success();
        let status = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, RunStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gate_resolves_exactly_once_under_races() {
        let gate = Arc::new(CompletionGate::new(RunId::new(), 1_000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                let mut wins = 0u32;
                for _ in 0..125 {
                    if gate.record_success() {
                        wins += 1;
                    }
                }
                if gate.try_resolve(RunStatus::Cancelled) {
                    wins += 1;
                }
                wins
            }));
        }

        let mut total_wins = 0;
        for handle in handles {
            total_wins += handle.await.unwrap();
        }
        assert_eq!(total_wins, 1);
        assert!(gate.state().is_terminal());
        assert_eq!(gate.recorded(), 1_000);
    }
}
