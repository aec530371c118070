//! Benchmarks for index range partitioning using criterion.
//!
//! These benchmarks measure:
//! - Static partition enumeration
//! - Dynamic cursor draws under a single thread
//! - Dynamic cursor draws contended by several threads

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sluice::{DynamicPartitioner, StaticPartitioner};

/// Benchmark: enumerate every static partition.
fn bench_static_iter(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_iter");

    for chunk in [1u64, 64, 4096] {
        let partitioner = StaticPartitioner::new(1_000_000, chunk).expect("valid partitioner");
        group.throughput(Throughput::Elements(partitioner.partition_count()));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &partitioner, |b, p| {
            b.iter(|| p.iter().map(|part| part.len()).sum::<u64>());
        });
    }

    group.finish();
}

/// Benchmark: drain a dynamic partitioner from one thread.
fn bench_dynamic_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_single");

    for chunk in [1u64, 64, 4096] {
        let count = 1_000_000u64.div_ceil(chunk);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let partitioner = DynamicPartitioner::new(1_000_000, chunk).expect("valid partitioner");
                let mut drawn = 0u64;
                while !partitioner.next_partition().is_empty() {
                    drawn += 1;
                }
                drawn
            });
        });
    }

    group.finish();
}

/// Benchmark: drain a dynamic partitioner from several threads at once.
///
/// Measures contention on the shared cursor.
fn bench_dynamic_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_contended");
    group.sample_size(30);

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let partitioner =
                    Arc::new(DynamicPartitioner::new(1_000_000, 16).expect("valid partitioner"));
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let partitioner = Arc::clone(&partitioner);
                        thread::spawn(move || {
                            let mut drawn = 0u64;
                            while !partitioner.next_partition().is_empty() {
                                drawn += 1;
                            }
                            drawn
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("draw thread panicked"))
                    .sum::<u64>()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_static_iter,
    bench_dynamic_single,
    bench_dynamic_contended
);
criterion_main!(benches);
