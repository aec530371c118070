use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::EngineError;

/// A permit for one unit of concurrent execution.
///
/// Returned by [`ExecutionSlots::acquire`]. The slot goes back to the pool
/// when the permit is dropped, whether the item succeeded or failed.
pub struct SlotPermit {
    counters: Arc<SlotCounters>,
    _permit: OwnedSemaphorePermit,
}

impl fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPermit")
            .field("in_flight", &self.counters.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        // Runs before `_permit` is released, so `in_flight` never exceeds the
        // semaphore's capacity.
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Default)]
struct SlotCounters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Fixed pool of execution slots shared by every worker of a run.
///
/// Backed by a tokio [`Semaphore`]; tracks the in-flight count and the peak
/// it reached for diagnostics. The counters never drive control decisions.
#[derive(Clone)]
pub struct ExecutionSlots {
    limit: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<SlotCounters>,
}

impl fmt::Debug for ExecutionSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSlots")
            .field("limit", &self.limit)
            .field("in_flight", &self.in_flight())
            .field("peak_in_flight", &self.peak_in_flight())
            .finish()
    }
}

impl ExecutionSlots {
    /// Create a pool with `limit` slots.
    pub fn new(limit: usize) -> Result<Self, EngineError> {
        if limit == 0 {
            return Err(EngineError::invalid("max_concurrency must be >= 1"));
        }
        if limit > Semaphore::MAX_PERMITS {
            return Err(EngineError::invalid(format!(
                "max_concurrency {limit} exceeds {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            counters: Arc::new(SlotCounters::default()),
        })
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<SlotPermit, EngineError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Worker("execution slots closed".into()))?;
        Ok(self.track(permit))
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<SlotPermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(self.track(permit)),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> SlotPermit {
        let now = self.counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.peak.fetch_max(now, Ordering::AcqRel);
        SlotPermit {
            counters: Arc::clone(&self.counters),
            _permit: permit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Items currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Highest in-flight count observed so far.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }

    /// Returns `(current, limit)`.
    pub fn utilization(&self) -> (usize, usize) {
        (self.in_flight(), self.limit)
    }

    pub fn has_capacity(&self) -> bool {
        self.semaphore.available_permits() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_limit_rejected() {
        assert!(matches!(
            ExecutionSlots::new(0),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_slots_enforce_limit() {
        let slots = ExecutionSlots::new(2).unwrap();

        let first = slots.acquire().await.unwrap();
        let second = slots.try_acquire().expect("second slot should be free");

        assert_eq!(slots.utilization(), (2, 2));
        assert!(!slots.has_capacity());
        assert!(slots.try_acquire().is_none(), "pool should be saturated");

        drop(first);
        assert_eq!(slots.in_flight(), 1);
        let third = slots.try_acquire().expect("released slot should be reusable");
        assert_eq!(slots.in_flight(), 2);

        drop(second);
        drop(third);
        assert_eq!(slots.utilization(), (0, 2));
        assert_eq!(slots.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let slots = ExecutionSlots::new(1).unwrap();
        let held = slots.acquire().await.unwrap();

        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "acquire should block while saturated");

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after release")
            .unwrap()
            .unwrap();
        assert_eq!(slots.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_peak_never_exceeds_limit() {
        let slots = ExecutionSlots::new(3).unwrap();
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let slots = slots.clone();
                tokio::spawn(async move {
                    let _permit = slots.acquire().await.unwrap();
                    assert!(slots.in_flight() <= 3);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                })
            })
            .collect();

        for handle in futures::future::join_all(handles).await {
            handle.unwrap();
        }
        assert!(slots.peak_in_flight() <= 3);
        assert_eq!(slots.in_flight(), 0);
    }
}
