use async_trait::async_trait;
use parking_lot::Mutex;
use sluice::ItemWorker;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct DispatchRecord {
    pub index: u64,
    pub at: Instant,
}

/// Succeeds on every index, returning the index itself, and remembers each
/// dispatch.
#[derive(Clone)]
pub struct RecordingWorker {
    dispatches: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl RecordingWorker {
    pub fn new() -> Self {
        Self {
            dispatches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self) -> Vec<DispatchRecord> {
        self.dispatches.lock().clone()
    }

    fn push(&self, index: u64) {
        self.dispatches.lock().push(DispatchRecord {
            index,
            at: Instant::now(),
        });
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.lock().len()
    }

    /// Dispatched indices, sorted.
    pub fn indices(&self) -> Vec<u64> {
        let mut indices: Vec<u64> = self.dispatches.lock().iter().map(|r| r.index).collect();
        indices.sort_unstable();
        indices
    }

    /// Indices that were dispatched more than once.
    pub fn duplicate_indices(&self) -> Vec<u64> {
        let mut counts = BTreeMap::new();
        for record in self.dispatches.lock().iter() {
            *counts.entry(record.index).or_insert(0usize) += 1;
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn assert_dispatch_count_eq(&self, expected: usize) {
        let actual = self.dispatch_count();
        assert_eq!(
            actual, expected,
            "Expected {} dispatches, got {}",
            expected, actual
        );
    }

    /// Assert every index in `[0, total)` ran exactly once.
    pub fn assert_each_index_once(&self, total: u64) {
        assert_eq!(
            self.indices(),
            (0..total).collect::<Vec<_>>(),
            "dispatches did not cover [0, {total}) exactly once"
        );
    }

    pub fn clear(&self) {
        self.dispatches.lock().clear();
    }
}

impl Default for RecordingWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemWorker<u64> for RecordingWorker {
    async fn execute(&self, index: u64) -> anyhow::Result<u64> {
        self.push(index);
        Ok(index)
    }
}

/// Returns an error for a chosen set of indices and the index otherwise.
#[derive(Clone)]
pub struct FailingWorker {
    failures: Arc<HashSet<u64>>,
    recorder: RecordingWorker,
}

impl FailingWorker {
    pub fn new(failures: impl IntoIterator<Item = u64>) -> Self {
        Self {
            failures: Arc::new(failures.into_iter().collect()),
            recorder: RecordingWorker::new(),
        }
    }

    /// Fail every index where `pred` holds, over `[0, total)`.
    pub fn matching(total: u64, pred: impl Fn(u64) -> bool) -> Self {
        Self::new((0..total).filter(|i| pred(*i)))
    }

    pub fn fails(&self, index: u64) -> bool {
        self.failures.contains(&index)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn recorder(&self) -> &RecordingWorker {
        &self.recorder
    }
}

#[async_trait]
impl ItemWorker<u64> for FailingWorker {
    async fn execute(&self, index: u64) -> anyhow::Result<u64> {
        self.recorder.push(index);
        if self.fails(index) {
            anyhow::bail!("injected failure at index {index}");
        }
        Ok(index)
    }
}

/// Panics for a chosen set of indices.
#[derive(Clone)]
pub struct PanickingWorker {
    panics: Arc<HashSet<u64>>,
    recorder: RecordingWorker,
}

impl PanickingWorker {
    pub fn new(panics: impl IntoIterator<Item = u64>) -> Self {
        Self {
            panics: Arc::new(panics.into_iter().collect()),
            recorder: RecordingWorker::new(),
        }
    }

    pub fn recorder(&self) -> &RecordingWorker {
        &self.recorder
    }
}

#[async_trait]
impl ItemWorker<u64> for PanickingWorker {
    async fn execute(&self, index: u64) -> anyhow::Result<u64> {
        self.recorder.push(index);
        if self.panics.contains(&index) {
            panic!("injected panic at index {index}");
        }
        Ok(index)
    }
}
