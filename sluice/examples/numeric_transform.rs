//! Numeric transform example.
//!
//! Multiplies every index of a large range by PI, once with horizontal
//! dispatch (items of a partition run back to back on a worker) and once
//! with vertical dispatch (one sub-task per item), and compares timings.
//!
//! Run with `RUST_LOG=sluice=debug` to see per-partition spans.

use std::f64::consts::PI;
use std::thread;

use sluice::*;

const ITEMS: u64 = 1_000_000;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

async fn transform(mode: DispatchMode, cores: usize) -> anyhow::Result<RunSummary> {
    let engine = Engine::builder()
        .with_total_items(ITEMS)
        .with_max_concurrency(cores)
        .with_chunk_hint(ITEMS / (cores as u64 * 4))
        .with_mode(mode)
        .build()?;

    let report = engine.run(fn_worker(|i| Ok(i as f64 * PI))).await?;
    let summary = report.summary.clone();

    let values = report.into_values().map_err(|f| anyhow::anyhow!("{f}"))?;
    let checksum: f64 = values.iter().sum();
    println!("{mode:?}: checksum {checksum:.3e}");

    Ok(summary)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    println!("Transforming {ITEMS} items on {cores} slots");

    for mode in [DispatchMode::Horizontal, DispatchMode::Vertical] {
        let summary = transform(mode, cores).await?;
        println!(
            "{mode:?}: {} items in {:?} ({} partitions, peak {} in flight)",
            summary.total, summary.elapsed, summary.partitions_total, summary.peak_in_flight
        );
    }

    println!("Done!");
    Ok(())
}
