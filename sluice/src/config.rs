use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EngineError;

/// How the index range is carved up and handed to workers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Fixed-size chunks pre-assigned round-robin to workers.
    Static,
    /// Fixed-size chunks handed out on demand from a shared cursor.
    #[default]
    Dynamic,
}

/// How a worker executes the items of the partition it drew.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Items of a partition run one after another on the worker.
    #[default]
    Horizontal,
    /// Every item of a partition becomes its own sub-task; the worker waits
    /// for all of them before drawing the next partition.
    Vertical,
}

/// Configuration for a single engine run.
///
/// Serializable so runs can be described in config files; the cancellation
/// signal is attached separately via
/// [`Engine::with_cancel_token`](crate::runtime::Engine::with_cancel_token).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of the index range `[0, total_items)`.
    pub total_items: u64,
    /// Maximum number of items executing at once.
    pub max_concurrency: usize,
    /// Chunk size handed to a worker per draw.
    pub chunk_hint: u64,
    /// Partitioning policy.
    #[serde(default)]
    pub policy: PartitionPolicy,
    /// Item dispatch mode inside a partition.
    #[serde(default)]
    pub mode: DispatchMode,
    /// Number of worker routines; defaults to `max_concurrency`.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Stop dispatching after this many milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Create a configuration with the default policy and mode.
    pub fn new(total_items: u64, max_concurrency: usize, chunk_hint: u64) -> Self {
        Self {
            total_items,
            max_concurrency,
            chunk_hint,
            policy: PartitionPolicy::default(),
            mode: DispatchMode::default(),
            workers: None,
            timeout_ms: None,
        }
    }

    /// Set the partitioning policy.
    pub fn with_policy(mut self, policy: PartitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the dispatch mode.
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set an explicit worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the run timeout. Sub-millisecond remainders round up, so a
    /// non-zero timeout never becomes zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_micros().div_ceil(1_000);
        self.timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Configured worker count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(self.max_concurrency)
    }

    /// Workers actually spawned for a source of `partitions` partitions:
    /// never more than there are partitions to draw, never fewer than one.
    pub fn workers_for(&self, partitions: u64) -> usize {
        let partitions = usize::try_from(partitions.max(1)).unwrap_or(usize::MAX);
        self.worker_count().min(partitions)
    }

    /// Number of partitions the configured policy carves the range into.
    pub fn partition_count(&self) -> u64 {
        self.total_items.div_ceil(self.chunk_hint.max(1))
    }

    /// Check the configuration before any work starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_concurrency == 0 {
            return Err(EngineError::invalid("max_concurrency must be >= 1"));
        }
        if self.chunk_hint == 0 {
            return Err(EngineError::invalid("chunk_hint must be >= 1"));
        }
        if self.workers == Some(0) {
            return Err(EngineError::invalid("workers must be >= 1 when set"));
        }
        if usize::try_from(self.total_items).is_err() {
            return Err(EngineError::invalid(format!(
                "total_items {} does not fit in addressable memory",
                self.total_items
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(0, 1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let err = EngineConfig::new(10, 0, 3).validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_hint() {
        let err = EngineConfig::new(10, 2, 0).validate().unwrap_err();
        assert!(err.to_string().contains("chunk_hint"));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = EngineConfig::new(10, 2, 3).with_workers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_range_is_valid() {
        assert!(EngineConfig::new(0, 1, 1).validate().is_ok());
    }

    #[test]
    fn test_workers_bounded_by_partitions() {
        let config = EngineConfig::new(1, 2_000_000, 1);
        assert_eq!(config.workers_for(config.partition_count()), 1);

        let config = EngineConfig::new(10, 100, 3);
        assert_eq!(config.partition_count(), 4);
        assert_eq!(config.workers_for(config.partition_count()), 4);

        // An empty range still gets one worker to observe exhaustion.
        assert_eq!(EngineConfig::new(0, 8, 2).workers_for(0), 1);
        assert_eq!(EngineConfig::new(100, 8, 2).with_workers(3).workers_for(50), 3);
    }

    #[test]
    fn test_sub_millisecond_timeout_rounds_up() {
        let config = EngineConfig::new(1, 1, 1).with_timeout(Duration::from_micros(500));
        assert_eq!(config.timeout_ms, Some(1));
        assert_eq!(config.timeout(), Some(Duration::from_millis(1)));

        let config = EngineConfig::new(1, 1, 1).with_timeout(Duration::from_micros(2_001));
        assert_eq!(config.timeout_ms, Some(3));
        let config = EngineConfig::new(1, 1, 1).with_timeout(Duration::ZERO);
        assert_eq!(config.timeout_ms, Some(0));
    }

    #[test]
    fn test_worker_count_defaults_to_concurrency() {
        let config = EngineConfig::new(10, 4, 3);
        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.with_workers(2).worker_count(), 2);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "total_items": 100, "max_concurrency": 4, "chunk_hint": 10 }"#,
        )
        .unwrap();
        assert_eq!(config.policy, PartitionPolicy::Dynamic);
        assert_eq!(config.mode, DispatchMode::Horizontal);
        assert_eq!(config.timeout(), None);

        let config: EngineConfig = serde_json::from_str(
            r#"{
                "total_items": 100,
                "max_concurrency": 4,
                "chunk_hint": 10,
                "policy": "static",
                "mode": "vertical",
                "timeout_ms": 250
            }"#,
        )
        .unwrap();
        assert_eq!(config.policy, PartitionPolicy::Static);
        assert_eq!(config.mode, DispatchMode::Vertical);
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
    }
}
