//! Benchmarks for submission and dispatch overhead

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use prio_pool::prelude::*;
use std::time::Duration;

fn executor(workers: usize) -> Executor {
    Executor::new(Config::builder().pool_size(workers).build().unwrap()).unwrap()
}

fn bench_round_trip(c: &mut Criterion) {
    let executor = executor(1);

    c.bench_function("submit_get_round_trip", |b| {
        b.iter(|| executor.submit(|| black_box(42u64)).unwrap().get().unwrap());
    });

    executor.graceful_shutdown(Duration::from_secs(5)).unwrap();
}

fn bench_batch_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_submit");

    for workers in [1, 2, 4] {
        let executor = executor(workers);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                let handles: Vec<_> = (0..1_000u64)
                    .map(|i| executor.submit(move || black_box(i * i)).unwrap())
                    .collect();
                handles.iter().map(|h| h.get().unwrap()).sum::<u64>()
            });
        });
        executor.graceful_shutdown(Duration::from_secs(5)).unwrap();
    }

    group.finish();
}

fn bench_mixed_priorities(c: &mut Criterion) {
    let executor = executor(2);

    c.bench_function("mixed_priorities", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..1_000usize)
                .map(|i| {
                    executor
                        .submit_with_priority(move || black_box(i), TaskType::ALL[i % 3])
                        .unwrap()
                })
                .collect();
            for h in &handles {
                h.wait().unwrap();
            }
        });
    });

    executor.graceful_shutdown(Duration::from_secs(5)).unwrap();
}

criterion_group!(
    benches,
    bench_round_trip,
    bench_batch_submit,
    bench_mixed_priorities
);
criterion_main!(benches);
