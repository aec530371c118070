use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EngineError;

/// A half-open range of item indices `[start, end)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub start: u64,
    pub end: u64,
}

impl Partition {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "partition start past end");
        Self { start, end }
    }

    /// The empty sentinel returned once a range of `n` items is exhausted.
    pub fn exhausted(n: u64) -> Self {
        Self { start: n, end: n }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn indices(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

fn check_chunk_hint(chunk_hint: u64) -> Result<(), EngineError> {
    if chunk_hint == 0 {
        return Err(EngineError::invalid("chunk_hint must be >= 1"));
    }
    Ok(())
}

/// A thread-safe supply of partitions shared by the workers of one run.
///
/// Implementors must hand out disjoint partitions whose union is the whole
/// range; the engine treats any overlap as a fatal `DuplicateWrite`.
pub trait PartitionSource: Send + Sync {
    /// Next partition for `worker`, or `None` once that worker has no more
    /// work.
    fn next_partition(&self, worker: usize) -> Option<Partition>;

    /// Total number of partitions this source produces.
    fn partition_count(&self) -> u64;
}

/// Splits `[0, n)` into `ceil(n / chunk_hint)` fixed-size chunks; the last one
/// may be shorter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StaticPartitioner {
    total: u64,
    chunk: u64,
}

impl StaticPartitioner {
    pub fn new(total: u64, chunk_hint: u64) -> Result<Self, EngineError> {
        check_chunk_hint(chunk_hint)?;
        Ok(Self {
            total,
            chunk: chunk_hint,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn partition_count(&self) -> u64 {
        self.total.div_ceil(self.chunk)
    }

    /// The `k`-th chunk, if it exists.
    pub fn nth_partition(&self, k: u64) -> Option<Partition> {
        if k >= self.partition_count() {
            return None;
        }
        let start = k * self.chunk;
        let end = start.saturating_add(self.chunk).min(self.total);
        Some(Partition::new(start, end))
    }

    /// Lazily yields every chunk in order. Each call starts from the
    /// beginning and yields the same sequence.
    pub fn iter(&self) -> impl Iterator<Item = Partition> + '_ {
        (0..self.partition_count()).filter_map(|k| self.nth_partition(k))
    }
}

/// Static assignment of chunks to a fixed set of workers: worker `w` gets
/// chunks `w, w + W, w + 2W, ...`.
///
/// Each worker owns its own cursor, so no two workers ever contend.
#[derive(Debug)]
pub struct StaticSchedule {
    partitioner: StaticPartitioner,
    workers: u64,
    cursors: Vec<AtomicU64>,
}

impl StaticSchedule {
    pub fn new(partitioner: StaticPartitioner, workers: usize) -> Result<Self, EngineError> {
        if workers == 0 {
            return Err(EngineError::invalid("static schedule needs at least one worker"));
        }
        Ok(Self {
            partitioner,
            workers: workers as u64,
            cursors: (0..workers).map(|_| AtomicU64::new(0)).collect(),
        })
    }
}

impl PartitionSource for StaticSchedule {
    fn next_partition(&self, worker: usize) -> Option<Partition> {
        let cursor = self.cursors.get(worker)?;
        let round = cursor.fetch_add(1, Ordering::Relaxed);
        let k = round.checked_mul(self.workers)?.checked_add(worker as u64)?;
        self.partitioner.nth_partition(k)
    }

    fn partition_count(&self) -> u64 {
        self.partitioner.partition_count()
    }
}

/// Hands out chunks of `chunk_hint` items from a shared cursor to whichever
/// worker asks first.
///
/// The cursor only moves forward and never passes `total`; once it reaches the
/// end every request returns [`Partition::exhausted`].
#[derive(Debug)]
pub struct DynamicPartitioner {
    total: u64,
    chunk: u64,
    cursor: AtomicU64,
}

impl DynamicPartitioner {
    pub fn new(total: u64, chunk_hint: u64) -> Result<Self, EngineError> {
        check_chunk_hint(chunk_hint)?;
        Ok(Self {
            total,
            chunk: chunk_hint,
            cursor: AtomicU64::new(0),
        })
    }

    /// Claim the next chunk, or the empty sentinel when none remain.
    pub fn next_partition(&self) -> Partition {
        let claimed = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.total)
                    .then(|| current.saturating_add(self.chunk).min(self.total))
            });

        match claimed {
            Ok(start) => Partition::new(start, start.saturating_add(self.chunk).min(self.total)),
            Err(_) => Partition::exhausted(self.total),
        }
    }

    /// Items not yet claimed by any worker.
    pub fn remaining(&self) -> u64 {
        self.total - self.cursor.load(Ordering::Acquire).min(self.total)
    }
}

impl PartitionSource for DynamicPartitioner {
    fn next_partition(&self, _worker: usize) -> Option<Partition> {
        let partition = DynamicPartitioner::next_partition(self);
        (!partition.is_empty()).then_some(partition)
    }

    fn partition_count(&self) -> u64 {
        self.total.div_ceil(self.chunk)
    }
}
