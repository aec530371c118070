//! Item stream example.
//!
//! Pushes a finite list of URLs through the engine with simulated transport
//! latency and failures, under an overall timeout. Failed fetches are logged
//! one by one and counted in the summary; the rest keep going.

use std::time::Duration;

use sluice::*;

/// Simulated fetch: latency depends on the host, some hosts never answer.
async fn fetch(url: String) -> anyhow::Result<usize> {
    let latency = 5 + (url.len() as u64 % 7) * 3;
    tokio::time::sleep(Duration::from_millis(latency)).await;
    if url.contains("unreachable") {
        anyhow::bail!("connection to {url} refused");
    }
    Ok(url.len() * 128)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let urls: Vec<String> = (0..500)
        .map(|i| match i % 25 {
            0 => format!("https://unreachable-{i}.example/"),
            _ => format!("https://mirror-{}.example/page/{i}", i % 8),
        })
        .collect();

    let engine = Engine::builder()
        .with_total_items(urls.len() as u64)
        .with_max_concurrency(16)
        .with_chunk_hint(8)
        .with_mode(DispatchMode::Vertical)
        .with_timeout(Duration::from_secs(2))
        .build()?;

    let report = engine
        .run_items(urls, |url: &String| fetch(url.clone()))
        .await?;

    let bytes: usize = report.successes().map(|(_, n)| *n).sum();
    let summary = &report.summary;
    println!(
        "{}: {} fetched ({} bytes), {} failed, {} never dispatched in {:?}",
        summary.status,
        summary.success_count,
        bytes,
        summary.failure_count,
        report.missing().count(),
        summary.elapsed
    );
    if let Some(first) = &summary.first_error {
        println!("first failure: {first}");
    }
    Ok(())
}
