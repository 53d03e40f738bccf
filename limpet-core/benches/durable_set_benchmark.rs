//! Benchmark comparing the durable set variants under insert-only and
//! mixed workloads.
//!
//! Run with: cargo bench --package limpet-core --bench durable_set_benchmark

use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use mimalloc::MiMalloc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use limpet_core::common_tests::SetFactory;
use limpet_core::{
    DurableSet, LinkFreeDurableSet, LockDurableSet, MrLockDurableSet, SoftDurableSet,
};
use limpet_storage::{PersistentStore, SoftStore};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const NUM_THREADS: usize = 4;
const OPS_PER_THREAD: usize = 2_000;
const KEY_RANGE: i64 = 1_024;

struct UseLinkFree;
struct UseSoft;
struct UseLock;
struct UseMrLock;

impl SetFactory for UseLinkFree {
    type Set = LinkFreeDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(PersistentStore::new(write_ops.len(), max_ops));
        LinkFreeDurableSet::new(store, abort, write_ops)
    }
}

impl SetFactory for UseSoft {
    type Set = SoftDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(SoftStore::new(write_ops.len(), max_ops));
        SoftDurableSet::new(store, abort, write_ops)
    }
}

impl SetFactory for UseLock {
    type Set = LockDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(PersistentStore::new(write_ops.len(), max_ops));
        LockDurableSet::new(store, abort, write_ops)
    }
}

impl SetFactory for UseMrLock {
    type Set = MrLockDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(PersistentStore::new(write_ops.len(), max_ops));
        MrLockDurableSet::new(store, abort, write_ops)
    }
}

/// Every thread inserts its own slice of the key range.
fn bench_insert_only<F>()
where
    F: SetFactory,
    F::Set: Send + Sync + 'static,
{
    let write_ops = vec![OPS_PER_THREAD; NUM_THREADS];
    let set = Arc::new(F::create(&write_ops, OPS_PER_THREAD));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|owner| {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                let base = (owner * OPS_PER_THREAD) as i64;
                for i in 0..OPS_PER_THREAD as i64 {
                    black_box(set.insert(base + i + 1, i, owner));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

/// 50% contains, 30% insert, 20% remove over a shared key range.
fn bench_mixed<F>()
where
    F: SetFactory,
    F::Set: Send + Sync + 'static,
{
    let write_ops = vec![OPS_PER_THREAD; NUM_THREADS];
    let set = Arc::new(F::create(&write_ops, OPS_PER_THREAD));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|owner| {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD as i64 {
                    let key = (i * 127 + owner as i64 * 31) % KEY_RANGE;
                    match i % 10 {
                        0..=4 => {
                            black_box(set.contains(key));
                        }
                        5..=7 => {
                            black_box(set.insert(key, key, owner));
                        }
                        _ => {
                            black_box(set.remove(key, owner));
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn insert_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_only");
    group.sample_size(10);
    group.bench_function(BenchmarkId::from_parameter("link_free"), |b| {
        b.iter(bench_insert_only::<UseLinkFree>)
    });
    group.bench_function(BenchmarkId::from_parameter("soft"), |b| {
        b.iter(bench_insert_only::<UseSoft>)
    });
    group.bench_function(BenchmarkId::from_parameter("lock"), |b| {
        b.iter(bench_insert_only::<UseLock>)
    });
    group.bench_function(BenchmarkId::from_parameter("mrlock"), |b| {
        b.iter(bench_insert_only::<UseMrLock>)
    });
    group.finish();
}

fn mixed_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_ops");
    group.sample_size(10);
    group.bench_function(BenchmarkId::from_parameter("link_free"), |b| {
        b.iter(bench_mixed::<UseLinkFree>)
    });
    group.bench_function(BenchmarkId::from_parameter("soft"), |b| {
        b.iter(bench_mixed::<UseSoft>)
    });
    group.bench_function(BenchmarkId::from_parameter("lock"), |b| {
        b.iter(bench_mixed::<UseLock>)
    });
    group.bench_function(BenchmarkId::from_parameter("mrlock"), |b| {
        b.iter(bench_mixed::<UseMrLock>)
    });
    group.finish();
}

criterion_group!(benches, insert_benchmarks, mixed_benchmarks);
criterion_main!(benches);
