use std::time::Duration;

use crate::config::{DispatchMode, EngineConfig, PartitionPolicy};
use crate::error::EngineError;

use super::cancel::CancelToken;
use super::engine::Engine;

/// Builder for constructing an [`Engine`] step by step.
///
/// `total_items` and `max_concurrency` are required; everything else falls
/// back to [`EngineConfig`] defaults. `build` validates the assembled
/// configuration before any run can start.
///
/// # Example
///
/// ```ignore
/// use sluice::*;
///
/// let engine = Engine::builder()
///     .with_total_items(1_000)
///     .with_max_concurrency(8)
///     .with_chunk_hint(64)
///     .with_policy(PartitionPolicy::Static)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder {
    total_items: Option<u64>,
    max_concurrency: Option<usize>,
    chunk_hint: Option<u64>,
    policy: PartitionPolicy,
    mode: DispatchMode,
    workers: Option<usize>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            total_items: Some(config.total_items),
            max_concurrency: Some(config.max_concurrency),
            chunk_hint: Some(config.chunk_hint),
            policy: config.policy,
            mode: config.mode,
            workers: config.workers,
            timeout: config.timeout(),
            cancel: None,
        }
    }

    /// Set the size of the index range `[0, total_items)`.
    pub fn with_total_items(mut self, total_items: u64) -> Self {
        self.total_items = Some(total_items);
        self
    }

    /// Set the cap on simultaneously executing items.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    /// Set the preferred partition size.
    pub fn with_chunk_hint(mut self, chunk_hint: u64) -> Self {
        self.chunk_hint = Some(chunk_hint);
        self
    }

    pub fn with_policy(mut self, policy: PartitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the number of worker routines.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the external cancellation signal.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the [`Engine`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if a required setting is
    /// missing or the configuration does not validate.
    pub fn build(self) -> Result<Engine, EngineError> {
        let total_items = self
            .total_items
            .ok_or_else(|| EngineError::invalid("total_items setting missing"))?;
        let max_concurrency = self
            .max_concurrency
            .ok_or_else(|| EngineError::invalid("max_concurrency setting missing"))?;

        let mut config = EngineConfig::new(total_items, max_concurrency, self.chunk_hint.unwrap_or(1))
            .with_policy(self.policy)
            .with_mode(self.mode);
        config.workers = self.workers;
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        let engine = Engine::new(config)?;
        Ok(match self.cancel {
            Some(token) => engine.with_cancel_token(token),
            None => engine,
        })
    }
}
