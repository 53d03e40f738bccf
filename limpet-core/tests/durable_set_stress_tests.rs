mod common;

use std::sync::Arc;
use std::thread;

use rand::Rng;
use rstest::rstest;
use serial_test::serial;

use common::{UseLinkFree, UseLock, UseMrLock, UseSoft};
use limpet_core::common_tests::durable_set_stress_tests::*;
use limpet_core::common_tests::SetFactory;
use limpet_core::DurableSet;

// The sequential variant is single-owner by design and sits these out.

#[rstest]
#[serial]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
fn test_disjoint_inserts<F>(#[case] _variant: F)
where
    F: SetFactory,
    F::Set: Send + Sync + 'static,
{
    test_concurrent_disjoint_inserts::<F>();
}

#[rstest]
#[serial]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
fn test_same_keys<F>(#[case] _variant: F)
where
    F: SetFactory,
    F::Set: Send + Sync + 'static,
{
    test_concurrent_same_keys::<F>();
}

#[rstest]
#[serial]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
fn test_reads<F>(#[case] _variant: F)
where
    F: SetFactory,
    F::Set: Send + Sync + 'static,
{
    test_reads_during_modifications::<F>();
}

#[rstest]
#[serial]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
fn test_quiesce_then_recover<F>(#[case] _variant: F)
where
    F: SetFactory,
    F::Set: Send + Sync + 'static,
{
    test_concurrent_then_recover::<F>();
}

/// Random op mix per thread; afterwards the list must be strictly ordered
/// and internally consistent.
#[rstest]
#[serial]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
fn test_random_workload<F>(#[case] _variant: F)
where
    F: SetFactory,
    F::Set: Send + Sync + 'static,
{
    let num_threads = 6;
    let ops_per_thread = 2_000;
    let key_range = 128i64;
    let write_ops = vec![ops_per_thread; num_threads];
    let set = Arc::new(F::create(&write_ops, ops_per_thread));

    let handles: Vec<_> = (0..num_threads)
        .map(|owner| {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..ops_per_thread {
                    let key = rng.random_range(0..key_range);
                    match rng.random_range(0..10) {
                        0..=4 => {
                            set.contains(key);
                        }
                        5..=7 => {
                            set.insert(key, key, owner);
                        }
                        _ => {
                            set.remove(key, owner);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let keys = set.to_vec();
    for window in keys.windows(2) {
        assert!(window[0] < window[1], "List is not sorted!");
    }
    for &key in &keys {
        assert!(set.contains(key));
    }
}
