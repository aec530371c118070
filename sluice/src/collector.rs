use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::EngineError;
use crate::outcome::Outcome;

/// Index-keyed sink for item outcomes.
///
/// Pre-sized to the run's item count so concurrent writers never resize it.
/// Every slot is a write-once cell: writers targeting disjoint indices never
/// block each other, and a second write to the same index is reported as
/// [`EngineError::DuplicateWrite`].
///
/// Reads go through [`seal`](Self::seal) first, which publishes every write
/// made before it.
pub struct ResultCollector<T> {
    slots: Vec<OnceLock<Outcome<T>>>,
    recorded: AtomicU64,
    sealed: AtomicBool,
}

impl<T> fmt::Debug for ResultCollector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCollector")
            .field("capacity", &self.slots.len())
            .field("recorded", &self.recorded())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

impl<T> ResultCollector<T> {
    pub fn new(total: u64) -> Result<Self, EngineError> {
        let len = usize::try_from(total).map_err(|_| {
            EngineError::invalid(format!("cannot allocate {total} outcome slots"))
        })?;
        Ok(Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
            recorded: AtomicU64::new(0),
            sealed: AtomicBool::new(false),
        })
    }

    pub fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Store the outcome for `index`.
    pub fn record(&self, index: u64, outcome: Outcome<T>) -> Result<(), EngineError> {
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.slots.get(i))
            .ok_or_else(|| {
                EngineError::Worker(format!(
                    "index {index} outside collector of {} items",
                    self.slots.len()
                ))
            })?;

        slot.set(outcome)
            .map_err(|_| EngineError::DuplicateWrite { index })?;
        self.recorded.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Number of outcomes stored so far.
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Acquire)
    }

    /// Mark the collector readable. Called once the run has drained.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Consume the collector, yielding outcomes in index order. Indices that
    /// never ran (cancelled or timed-out runs) are `None`.
    pub fn into_outcomes(self) -> Vec<Option<Outcome<T>>> {
        self.slots.into_iter().map(OnceLock::into_inner).collect()
    }
}

impl<T: Clone> ResultCollector<T> {
    /// Copy of every outcome in index order. Fails until [`seal`](Self::seal)
    /// has been called.
    pub fn snapshot(&self) -> Result<Vec<Option<Outcome<T>>>, EngineError> {
        if !self.is_sealed() {
            return Err(EngineError::NotSealed);
        }
        Ok(self.slots.iter().map(|slot| slot.get().cloned()).collect())
    }
}
