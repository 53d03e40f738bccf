//! Random workload driver for the durable set family.
//!
//! Three positional arguments: the number of operations per thread, the
//! insert chance and the remove chance (both out of 10). Each of the four
//! worker threads rolls a pre-generated decision die per operation:
//! `1..=insert_chance` inserts, the next `remove_chance` values remove,
//! anything above reads. Reports wall-clock runtime and the post-run set
//! size; a per-thread delta of successful inserts minus successful removes
//! cross-checks the size.

use std::env;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use rand::Rng;

use limpet_core::{DurableSet, MrLockDurableSet};
use limpet_storage::PersistentStore;

const NUM_THREADS: usize = 4;
const ITEM_RANGE: i64 = 10;

struct Config {
    num_ops: usize,
    insert_chance: u32,
    /// Cumulative: a decision in (insert_chance, remove_chance] removes.
    remove_chance: u32,
}

/// One-to-one item-to-key mapping for the test workload.
fn key_of(item: i64) -> i64 {
    item
}

fn parse_args(args: &[String]) -> Option<Config> {
    if args.len() != 3 {
        println!("Incorrect number of arguments.");
        return None;
    }
    let mut parsed = args.iter().map(|arg| arg.parse::<u32>());
    let (Some(Ok(num_ops)), Some(Ok(insert_chance)), Some(Ok(remove_chance))) =
        (parsed.next(), parsed.next(), parsed.next())
    else {
        println!("One of the arguments is not a positive integer.");
        return None;
    };
    if !(5..=150_000).contains(&num_ops) {
        println!("First argument is not an integer from 5 to 150000.");
        return None;
    }
    if !(3..=10).contains(&insert_chance) {
        println!("Second argument is not an integer from 3 to 10.");
        return None;
    }
    if remove_chance > 6 {
        println!("Third argument is not an integer from 0 to 6.");
        return None;
    }
    if insert_chance + remove_chance > 10 {
        println!("The second and third arguments do not add to an integer of at most 10.");
        return None;
    }
    Some(Config {
        num_ops: num_ops as usize,
        insert_chance,
        remove_chance: insert_chance + remove_chance,
    })
}

fn run_thread(
    owner: usize,
    decisions: &[u32],
    items: &[i64],
    set: &MrLockDurableSet<i64>,
    config: &Config,
) -> i64 {
    let mut delta = 0i64;
    for (decision, &item) in decisions.iter().zip(items) {
        if *decision <= config.insert_chance {
            if set.insert(key_of(item), item, owner) {
                delta += 1;
            }
        } else if *decision <= config.remove_chance {
            if set.remove(key_of(item), owner) {
                delta -= 1;
            }
        } else {
            set.contains(key_of(item));
        }
    }
    delta
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(config) = parse_args(&args) else {
        // Argument errors report a diagnostic and exit cleanly.
        return ExitCode::SUCCESS;
    };

    // Pre-generate the decision and item vectors for each thread.
    let mut rng = rand::rng();
    let decisions: Vec<Vec<u32>> = (0..NUM_THREADS)
        .map(|_| (0..config.num_ops).map(|_| rng.random_range(1..=10)).collect())
        .collect();
    let items: Vec<Vec<i64>> = (0..NUM_THREADS)
        .map(|_| {
            (0..config.num_ops)
                .map(|_| rng.random_range(0..=ITEM_RANGE))
                .collect()
        })
        .collect();

    // Size each owner's arena by its actual insert count.
    let write_ops: Vec<usize> = decisions
        .iter()
        .map(|thread_decisions| {
            thread_decisions
                .iter()
                .filter(|&&decision| decision <= config.insert_chance)
                .count()
        })
        .collect();
    let max_write_ops = write_ops.iter().copied().max().unwrap_or(0);

    let store = Arc::new(PersistentStore::new(NUM_THREADS, max_write_ops));
    let abort = Arc::new(AtomicBool::new(false));
    let set = MrLockDurableSet::new(store, abort, &write_ops);

    let start = Instant::now();
    let deltas: Vec<i64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|owner| {
                let decisions = &decisions[owner];
                let items = &items[owner];
                let set = &set;
                let config = &config;
                scope.spawn(move || run_thread(owner, decisions, items, set, config))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let elapsed = start.elapsed();

    let total_delta: i64 = deltas.iter().sum();

    println!("Computational runtime was {} milliseconds", elapsed.as_millis());
    println!("Total of {NUM_THREADS} threads: insert(), remove() and contains() operations");
    println!("Total of {} operations for each thread", config.num_ops);
    println!("Total delta: {total_delta} should equal size of the set");
    println!("Set size: {}", set.len());

    ExitCode::SUCCESS
}
