use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::collector::ResultCollector;
use crate::config::DispatchMode;
use crate::error::EngineError;
use crate::gate::{CompletionGate, RunId};
use crate::outcome::{ItemFailure, Outcome};
use crate::partition::{Partition, PartitionSource};
use crate::slots::{ExecutionSlots, SlotPermit};
use crate::telemetry;
use crate::worker_fn::ItemWorker;

use super::cancel::CancelToken;

/// State shared by every worker routine of one run.
pub(crate) struct RunContext<T, W> {
    pub run_id: RunId,
    pub mode: DispatchMode,
    pub worker: Arc<W>,
    pub source: Arc<dyn PartitionSource>,
    pub slots: ExecutionSlots,
    pub collector: Arc<ResultCollector<T>>,
    pub gate: Arc<CompletionGate>,
    /// Internal stop signal: user cancellation, timeout, or a fatal error.
    pub stop: CancelToken,
    pub partitions_drawn: AtomicU64,
    pub load: RunLoad,
}

/// In-flight accounting scoped to one run. The slot pool outlives runs, so
/// its own counters cannot describe a single one.
#[derive(Debug, Default)]
pub(crate) struct RunLoad {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RunLoad {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

impl<T, W> RunContext<T, W>
where
    T: Send + Sync + 'static,
    W: ItemWorker<T> + 'static,
{
    /// Wait for a slot unless the run is stopping.
    async fn acquire_slot(&self) -> Result<Option<SlotPermit>, EngineError> {
        if self.stop.is_cancelled() {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Ok(None),
            permit = self.slots.acquire() => {
                let permit = permit?;
                self.load.enter();
                self.report_utilization();
                Ok(Some(permit))
            }
        }
    }

    fn release_slot(&self, permit: SlotPermit) {
        drop(permit);
        self.load.exit();
        self.report_utilization();
    }

    fn report_utilization(&self) {
        telemetry::set_slot_utilization(self.slots.in_flight(), self.slots.limit());
    }
}

/// Worker routine: draw partitions until the source runs dry or the run
/// stops.
pub(crate) async fn run_worker<T, W>(
    ctx: Arc<RunContext<T, W>>,
    worker_index: usize,
) -> Result<(), EngineError>
where
    T: Send + Sync + 'static,
    W: ItemWorker<T> + 'static,
{
    let worker_id = format!("{}-w{}", ctx.run_id, worker_index);

    loop {
        if ctx.stop.is_cancelled() {
            tracing::debug!(worker_id = %worker_id, "worker stopping");
            break;
        }

        let Some(partition) = ctx.source.next_partition(worker_index) else {
            break;
        };
        ctx.partitions_drawn.fetch_add(1, Ordering::Relaxed);

        let span = telemetry::partition_span(&worker_id, partition);
        match ctx.mode {
            DispatchMode::Horizontal => run_horizontal(&ctx, partition).instrument(span).await?,
            DispatchMode::Vertical => run_vertical(&ctx, partition).instrument(span).await?,
        }
    }

    Ok(())
}

/// Items of the partition run one after another on this worker.
async fn run_horizontal<T, W>(
    ctx: &Arc<RunContext<T, W>>,
    partition: Partition,
) -> Result<(), EngineError>
where
    T: Send + Sync + 'static,
    W: ItemWorker<T> + 'static,
{
    for index in partition.indices() {
        let Some(permit) = ctx.acquire_slot().await? else {
            break;
        };
        let result = execute_item(ctx, index).await;
        ctx.release_slot(permit);
        result?;
    }
    Ok(())
}

/// One sub-task per item, all drawing on the run's global slots; the worker
/// waits for the whole partition before returning.
async fn run_vertical<T, W>(
    ctx: &Arc<RunContext<T, W>>,
    partition: Partition,
) -> Result<(), EngineError>
where
    T: Send + Sync + 'static,
    W: ItemWorker<T> + 'static,
{
    let mut items = JoinSet::new();

    for index in partition.indices() {
        let Some(permit) = ctx.acquire_slot().await? else {
            break;
        };
        let ctx = Arc::clone(ctx);
        items.spawn(
            async move {
                let result = execute_item(&ctx, index).await;
                ctx.release_slot(permit);
                result
            }
            .in_current_span(),
        );
    }

    while let Some(joined) = items.join_next().await {
        let result = joined
            .map_err(|err| EngineError::Worker(format!("item task failed: {err}")))
            .and_then(|r| r);
        if let Err(err) = result {
            items.abort_all();
            return Err(err);
        }
    }
    Ok(())
}

/// Run one item behind the panic boundary and record its outcome.
async fn execute_item<T, W>(ctx: &RunContext<T, W>, index: u64) -> Result<(), EngineError>
where
    T: Send + Sync + 'static,
    W: ItemWorker<T> + 'static,
{
    let timing = telemetry::record_item_start(index);
    let result = AssertUnwindSafe(ctx.worker.execute(index))
        .catch_unwind()
        .instrument(telemetry::item_span(index))
        .await;

    let outcome = match result {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(err)) => Outcome::Failure(ItemFailure::from_error(index, &err)),
        Err(payload) => Outcome::Failure(ItemFailure::from_panic(index, payload)),
    };

    let status = outcome.status_str();
    let failure = outcome.failure().cloned();
    if let Some(failure) = &failure {
        telemetry::record_item_failed(index, &failure.message, failure.panicked);
    }

    // The collector write happens before the gate counts the item, so a
    // resolved gate implies every outcome is stored.
    ctx.collector.record(index, outcome)?;
    match failure {
        None => ctx.gate.record_success(),
        Some(failure) => ctx.gate.record_failure(failure),
    };

    telemetry::record_item_end(timing, status);
    Ok(())
}
