use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinSet;
use tracing::Instrument;

use crate::collector::ResultCollector;
use crate::config::{EngineConfig, PartitionPolicy};
use crate::error::EngineError;
use crate::gate::{CompletionGate, PartitionStats, RunId, RunStatus, RunSummary};
use crate::outcome::{ItemFailure, Outcome};
use crate::partition::{DynamicPartitioner, PartitionSource, StaticPartitioner, StaticSchedule};
use crate::slots::ExecutionSlots;
use crate::telemetry;
use crate::worker_fn::{ItemWorker, SliceWorker};

use super::builder::EngineBuilder;
use super::cancel::CancelToken;
use super::worker::{RunContext, RunLoad, run_worker};

/// Everything a run produced: the terminal summary plus one entry per index.
///
/// `outcomes[i]` is `None` only when the run was cancelled or timed out
/// before item `i` was dispatched.
#[derive(Debug)]
pub struct RunReport<T> {
    pub summary: RunSummary,
    pub outcomes: Vec<Option<Outcome<T>>>,
}

impl<T> RunReport<T> {
    pub fn status(&self) -> RunStatus {
        self.summary.status
    }

    /// Successful values with their indices, in index order.
    pub fn successes(&self) -> impl Iterator<Item = (u64, &T)> + '_ {
        self.outcomes.iter().enumerate().filter_map(|(i, o)| match o {
            Some(Outcome::Success(v)) => Some((i as u64, v)),
            _ => None,
        })
    }

    /// Recorded failures, in index order.
    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.as_ref().and_then(Outcome::failure))
    }

    /// Indices that never produced an outcome.
    pub fn missing(&self) -> impl Iterator<Item = u64> + '_ {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_none())
            .map(|(i, _)| i as u64)
    }

    /// All values in index order, or the first failure / gap encountered.
    pub fn into_values(self) -> Result<Vec<T>, ItemFailure> {
        self.outcomes
            .into_iter()
            .enumerate()
            .map(|(i, o)| match o {
                Some(outcome) => outcome.into_result(),
                None => Err(ItemFailure::new(i as u64, "item was never dispatched")),
            })
            .collect()
    }
}

/// Composition root: validates a configuration, then drives partitioner,
/// workers, collector, and completion gate for a run.
///
/// One engine is meant to serve one run. Sequential runs on the same engine
/// reuse its slot pool; concurrent runs on it share the cap.
pub struct Engine {
    config: EngineConfig,
    slots: ExecutionSlots,
    cancel: CancelToken,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("slots", &self.slots)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Engine {
    /// Create an engine, rejecting invalid configuration up front.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let slots = ExecutionSlots::new(config.max_concurrency)?;
        Ok(Self {
            config,
            slots,
            cancel: CancelToken::new(),
        })
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Attach an external cancellation signal.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The token that cancels this engine's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Items currently executing. Diagnostic only.
    pub fn in_flight(&self) -> usize {
        self.slots.in_flight()
    }

    /// Highest in-flight count observed across every run of this engine.
    /// Per-run peaks are reported in [`RunSummary::peak_in_flight`].
    pub fn peak_in_flight(&self) -> usize {
        self.slots.peak_in_flight()
    }

    fn partition_source(
        &self,
        config: &EngineConfig,
    ) -> Result<Arc<dyn PartitionSource>, EngineError> {
        Ok(match config.policy {
            PartitionPolicy::Static => Arc::new(StaticSchedule::new(
                StaticPartitioner::new(config.total_items, config.chunk_hint)?,
                config.workers_for(config.partition_count()),
            )?),
            PartitionPolicy::Dynamic => Arc::new(DynamicPartitioner::new(
                config.total_items,
                config.chunk_hint,
            )?),
        })
    }

    /// Run `worker` over every index in `[0, total_items)`.
    pub async fn run<T, W>(&self, worker: W) -> Result<RunReport<T>, EngineError>
    where
        T: Send + Sync + 'static,
        W: ItemWorker<T> + 'static,
    {
        let source = self.partition_source(&self.config)?;
        self.execute(self.config.clone(), source, Arc::new(worker)).await
    }

    /// Run `f` over a finite list of opaque items. The item count replaces
    /// the configured `total_items`; outcome `i` belongs to `items[i]`.
    pub async fn run_items<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        f: F,
    ) -> Result<RunReport<T>, EngineError>
    where
        I: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: Fn(&I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let config = EngineConfig {
            total_items: items.len() as u64,
            ..self.config.clone()
        };
        config.validate()?;
        let source = self.partition_source(&config)?;
        self.execute(config, source, Arc::new(SliceWorker::new(items, f)))
            .await
    }

    /// Run with a caller-supplied partition source covering
    /// `[0, total_items)`.
    pub async fn run_with_source<T, W, S>(
        &self,
        source: S,
        worker: W,
    ) -> Result<RunReport<T>, EngineError>
    where
        T: Send + Sync + 'static,
        W: ItemWorker<T> + 'static,
        S: PartitionSource + 'static,
    {
        self.execute(self.config.clone(), Arc::new(source), Arc::new(worker))
            .await
    }

    async fn execute<T, W>(
        &self,
        config: EngineConfig,
        source: Arc<dyn PartitionSource>,
        worker: Arc<W>,
    ) -> Result<RunReport<T>, EngineError>
    where
        T: Send + Sync + 'static,
        W: ItemWorker<T> + 'static,
    {
        let run_id = RunId::new();
        let span = telemetry::run_span(
            run_id,
            config.total_items,
            config.max_concurrency,
            config.mode,
        );
        self.drive(run_id, config, source, worker)
            .instrument(span)
            .await
    }

    async fn drive<T, W>(
        &self,
        run_id: RunId,
        config: EngineConfig,
        source: Arc<dyn PartitionSource>,
        worker: Arc<W>,
    ) -> Result<RunReport<T>, EngineError>
    where
        T: Send + Sync + 'static,
        W: ItemWorker<T> + 'static,
    {
        let total = config.total_items;
        let partitions_total = source.partition_count();
        let worker_count = config.workers_for(partitions_total);
        let collector = Arc::new(ResultCollector::new(total)?);
        let gate = Arc::new(CompletionGate::new(run_id, total));
        let stop = CancelToken::new();
        if self.cancel.is_cancelled() {
            stop.cancel();
        }

        let ctx = Arc::new(RunContext {
            run_id,
            mode: config.mode,
            worker,
            source,
            slots: self.slots.clone(),
            collector: Arc::clone(&collector),
            gate: Arc::clone(&gate),
            stop: stop.clone(),
            partitions_drawn: AtomicU64::new(0),
            load: RunLoad::default(),
        });

        tracing::info!(
            partitions_total = partitions_total,
            workers = worker_count,
            policy = ?config.policy,
            "run started"
        );

        let mut workers = JoinSet::new();
        for worker_index in 0..worker_count {
            workers.spawn(run_worker(Arc::clone(&ctx), worker_index).in_current_span());
        }

        let deadline = config.timeout();
        let timed_out = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let drained = tokio::select! {
            result = drain(&mut workers) => Some(result),
            _ = self.cancel.cancelled() => {
                if gate.try_resolve(RunStatus::Cancelled) {
                    tracing::info!(recorded = gate.recorded(), "run cancelled; draining in-flight items");
                }
                stop.cancel();
                None
            }
            _ = timed_out => {
                if gate.try_resolve(RunStatus::TimedOut) {
                    tracing::warn!(recorded = gate.recorded(), "run timed out; draining in-flight items");
                }
                stop.cancel();
                None
            }
        };

        let result = match drained {
            Some(result) => result,
            None => drain(&mut workers).await,
        };

        if let Err(err) = result {
            stop.cancel();
            workers.abort_all();
            while workers.join_next().await.is_some() {}
            telemetry::record_run_aborted(run_id, &err);
            return Err(err);
        }

        gate.finish();
        collector.seal();
        let summary = gate.summarize(PartitionStats {
            partitions_total,
            partitions_drawn: ctx.partitions_drawn.load(Ordering::Relaxed),
            workers: worker_count,
            peak_in_flight: ctx.load.peak(),
        });
        telemetry::record_run_finished(&summary);

        drop(ctx);
        let collector = Arc::try_unwrap(collector)
            .map_err(|_| EngineError::Worker("result collector still shared after drain".into()))?;

        Ok(RunReport {
            summary,
            outcomes: collector.into_outcomes(),
        })
    }
}

/// Join every worker, stopping at the first one that failed.
async fn drain(workers: &mut JoinSet<Result<(), EngineError>>) -> Result<(), EngineError> {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(err) => return Err(EngineError::Worker(format!("worker task failed: {err}"))),
        }
    }
    Ok(())
}
