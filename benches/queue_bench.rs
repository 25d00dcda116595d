//! Benchmarks for the worker pool's submit/drain throughput.
//!
//! Covers:
//! - Raw task-queue enqueue/dequeue cost (no worker threads involved)
//! - End-to-end submit-then-wait throughput for a static pool
//! - The same, for a dynamically-sized pool under burst load

use std::convert::Infallible;
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use workpool::{Pool, PoolBuilder, WorkerPoolConfig};

fn bench_static_pool_submit_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_pool_submit_and_drain");

    for &task_count in &[100u64, 1_000, 5_000] {
        group.throughput(Throughput::Elements(task_count));
        group.bench_with_input(
            BenchmarkId::from_parameter(task_count),
            &task_count,
            |b, &task_count| {
                let cfg = WorkerPoolConfig {
                    max_workers: 8,
                    ..WorkerPoolConfig::default()
                };
                let pool: Pool<(), Infallible> = PoolBuilder::new(cfg).build().unwrap();

                b.iter(|| {
                    for _ in 0..task_count {
                        pool.submit_fire_and_forget(|_cancel| {
                            black_box(1 + 1);
                        })
                        .unwrap();
                    }
                    pool.wait();
                });

                pool.release();
            },
        );
    }
    group.finish();
}

fn bench_dynamic_pool_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_pool_burst");
    group.throughput(Throughput::Elements(2_000));

    group.bench_function("min4_max32", |b| {
        let cfg = WorkerPoolConfig {
            max_workers: 32,
            min_workers: Some(4),
            ..WorkerPoolConfig::default()
        };
        let pool: Pool<(), Infallible> = PoolBuilder::new(cfg).build().unwrap();

        b.iter(|| {
            let completed = Arc::new(AtomicUsize::new(0));
            for _ in 0..2_000 {
                let completed = Arc::clone(&completed);
                pool.submit_fire_and_forget(move |_cancel| {
                    completed.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            }
            pool.wait();
            black_box(completed.load(Ordering::Relaxed));
        });

        pool.release();
    });
    group.finish();
}

fn bench_submit_with_retry_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_with_retry_budget");
    group.throughput(Throughput::Elements(500));

    group.bench_function("retry_count_2_always_succeeds", |b| {
        let cfg = WorkerPoolConfig {
            max_workers: 8,
            retry_count: 2,
            timeout: Some(Duration::from_millis(50)),
            ..WorkerPoolConfig::default()
        };
        let pool: Pool<(), Infallible> = PoolBuilder::new(cfg).build().unwrap();

        b.iter(|| {
            for _ in 0..500 {
                pool.submit_fire_and_forget(|_cancel| {
                    black_box(1 + 1);
                })
                .unwrap();
            }
            pool.wait();
        });

        pool.release();
    });
    group.finish();
}

criterion_group!(
    pool_benches,
    bench_static_pool_submit_and_drain,
    bench_dynamic_pool_burst,
    bench_submit_with_retry_budget
);
criterion_main!(pool_benches);
