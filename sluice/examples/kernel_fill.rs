//! Kernel-style fill example.
//!
//! Fills a buffer with `index + constant` through the engine, treating each
//! item like a device kernel invocation on the blocking pool, then verifies
//! every element on the host.

use std::thread;

use sluice::*;

const LEN: u64 = 1024;
const CONSTANT: u64 = 42;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let slots = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let engine = Engine::builder()
        .with_total_items(LEN)
        .with_max_concurrency(slots)
        .with_chunk_hint(64)
        .with_policy(PartitionPolicy::Static)
        .build()?;
    println!("Performing fill on {slots} slots");

    let report = engine
        .run(blocking_worker(|index| Ok(index + CONSTANT)))
        .await?;

    let mut errors = 0;
    for (i, outcome) in report.outcomes.iter().enumerate() {
        match outcome.as_ref().and_then(Outcome::value) {
            Some(&v) if v == i as u64 + CONSTANT => {}
            found => {
                errors += 1;
                println!("Error at element location {i}: {found:?} found");
            }
        }
    }

    println!(
        "{} elements, {} mismatches, status {}",
        report.summary.total, errors, report.summary.status
    );
    println!("Done!");
    Ok(())
}
