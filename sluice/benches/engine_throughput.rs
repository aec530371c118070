//! Benchmarks for full engine runs using criterion.
//!
//! These benchmarks measure end-to-end throughput of trivial items across
//! partition policies, dispatch modes, and concurrency caps.

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sluice::{DispatchMode, Engine, EngineConfig, PartitionPolicy, fn_worker};
use tokio::runtime::Runtime;

const ITEMS: u64 = 10_000;

/// Creates a tokio runtime for async benchmarks.
fn create_runtime() -> Runtime {
    Runtime::new().expect("Failed to create tokio runtime")
}

/// Benchmark: run a cheap transform under each policy and mode.
fn bench_shapes(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("engine_shapes");
    group.sample_size(20);
    group.throughput(Throughput::Elements(ITEMS));

    for policy in [PartitionPolicy::Static, PartitionPolicy::Dynamic] {
        for mode in [DispatchMode::Horizontal, DispatchMode::Vertical] {
            let id = BenchmarkId::new(format!("{policy:?}"), format!("{mode:?}"));
            group.bench_function(id, |b| {
                b.to_async(&rt).iter(|| async move {
                    let config = EngineConfig::new(ITEMS, 8, 128)
                        .with_policy(policy)
                        .with_mode(mode);
                    let engine = Engine::new(config).expect("valid config");
                    engine
                        .run(fn_worker(|i| Ok(i as f64 * std::f64::consts::PI)))
                        .await
                        .expect("run should succeed")
                });
            });
        }
    }

    group.finish();
}

/// Benchmark: scale the slot cap.
fn bench_concurrency(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("engine_concurrency");
    group.sample_size(20);
    group.throughput(Throughput::Elements(ITEMS));

    for max in [1usize, 4, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(max), &max, |b, &max| {
            b.to_async(&rt).iter(|| async move {
                let engine = Engine::new(EngineConfig::new(ITEMS, max, 256)).expect("valid config");
                engine
                    .run(fn_worker(|i| Ok(i.wrapping_mul(31))))
                    .await
                    .expect("run should succeed")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_shapes, bench_concurrency);
criterion_main!(benches);
