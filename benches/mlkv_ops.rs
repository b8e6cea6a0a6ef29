//! Benchmarks for the staleness-bounded operations
//!
//! - Plain upsert/read baselines through an engine session
//! - Bounded reads and upserts on a fixed embedding width
//! - Concurrent bounded reads hammering a small hot set

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use mlkv::contexts::{MlkvReadContext, MlkvUpsertContext, SimpleReadContext, SimpleUpsertContext};
use mlkv::store::{FasterKv, FasterKvConfig};
use mlkv::{Key, MlkvStore};

// =============================================================================
// Helper Functions
// =============================================================================

const NUM_KEYS: u64 = 100_000;

fn create_store(dir: &std::path::Path) -> Arc<FasterKv> {
    let config = FasterKvConfig {
        table_size: 1 << 17,
        log_memory_size: 1 << 28,
        page_size_bits: 22,
        mutable_fraction: 0.9,
    };
    Arc::new(FasterKv::new(config, dir).unwrap())
}

fn populate(store: &Arc<FasterKv>, width: usize) {
    let mut session = store.start_session();
    for i in 0..NUM_KEYS {
        let mut ctx = SimpleUpsertContext::new(Key(i), vec![0u8; width]);
        session.upsert(&mut ctx, |_, _| {});
    }
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("baseline");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(5));

    let dir = tempfile::tempdir().unwrap();
    let store = create_store(dir.path());
    populate(&store, 64);
    let mut session = store.start_session();
    let mut rng = rand::thread_rng();
    let payload = vec![1u8; 64];

    group.bench_function("upsert", |b| {
        b.iter(|| {
            let key = rng.gen_range(0..NUM_KEYS);
            let mut ctx = SimpleUpsertContext::new(Key(key), payload.clone());
            black_box(session.upsert(&mut ctx, |_, _| {}))
        })
    });

    group.bench_function("read", |b| {
        b.iter(|| {
            let key = rng.gen_range(0..NUM_KEYS);
            let mut ctx = SimpleReadContext::new(Key(key));
            black_box(session.read(&mut ctx, |_, _| {}))
        })
    });

    group.finish();
}

fn bench_bounded(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(5));

    for width in [16usize, 64, 256] {
        let dir = tempfile::tempdir().unwrap();
        let store = create_store(dir.path());
        populate(&store, width);
        let mut session = store.start_session();
        let mut rng = rand::thread_rng();
        let payload = vec![2u8; width];
        let mut op_counter = 0u64;

        // Alternating reads and upserts keep staleness under the bound.
        group.bench_with_input(BenchmarkId::new("read_upsert", width), &width, |b, &width| {
            b.iter(|| {
                let key = rng.gen_range(0..NUM_KEYS);
                let status = if op_counter % 2 == 0 {
                    let mut ctx = MlkvReadContext::new(Key(key), width);
                    session.rmw(&mut ctx, |_, _| {})
                } else {
                    let mut ctx = MlkvUpsertContext::new(Key(key), payload.clone());
                    session.rmw(&mut ctx, |_, _| {})
                };
                op_counter += 1;
                black_box(status)
            })
        });
    }

    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_concurrent_hot_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_hot_set");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for num_threads in [1usize, 2, 4] {
        let ops_per_thread = 10_000u64;
        group.throughput(Throughput::Elements(num_threads as u64 * ops_per_thread));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let dir = tempfile::tempdir().unwrap();
                    let store = MlkvStore::open(1 << 12, 1 << 26, dir.path()).unwrap();
                    for key in 0..64u64 {
                        store.upsert(key, &[0u8; 64]);
                    }

                    let handles: Vec<_> = (0..num_threads)
                        .map(|t| {
                            let store = store.clone();
                            thread::spawn(move || {
                                store.start_session();
                                let mut rng = StdRng::seed_from_u64(t as u64);
                                for i in 0..ops_per_thread {
                                    let key = rng.gen_range(0..64u64);
                                    if i % 2 == 0 {
                                        let _ = store.mlkv_read(key, 64);
                                    } else {
                                        store.mlkv_upsert(key, &[1u8; 64]);
                                    }
                                }
                                store.stop_session();
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_baseline, bench_bounded, bench_concurrent_hot_set);
criterion_main!(benches);
