use std::cell::UnsafeCell;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use limpet_mrlock::MrLock;

/// Plain counters protected only by the resource masks that guard them.
struct MaskedCounters(UnsafeCell<[u64; 32]>);

// Safety: tests only touch a counter while holding its resource bit, so no
// two threads access the same slot concurrently.
unsafe impl Sync for MaskedCounters {}

#[test]
fn test_overlapping_masks_are_mutually_exclusive() {
    let lock = Arc::new(MrLock::new(16));
    let counters = Arc::new(MaskedCounters(UnsafeCell::new([0; 32])));
    let num_threads = 8;
    let increments = 2_000;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let lock = Arc::clone(&lock);
            let counters = Arc::clone(&counters);
            thread::spawn(move || {
                // Every thread hits bit 0 plus one private bit, so all
                // requests conflict on bit 0.
                let mask = 0b1 | (1u32 << (t + 1));
                for _ in 0..increments {
                    let _guard = lock.lock(mask);
                    unsafe {
                        let slots = &mut *counters.0.get();
                        slots[0] += 1;
                        slots[t + 1] += 1;
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let slots = unsafe { &*counters.0.get() };
    assert_eq!(slots[0], (num_threads as u64) * increments);
    for t in 0..num_threads {
        assert_eq!(slots[t + 1], increments);
    }
}

#[test]
fn test_disjoint_masks_admitted_concurrently() {
    let lock = Arc::new(MrLock::new(8));
    // Both threads must sit inside their critical sections at the same
    // time for the barrier to release; a serializing lock would deadlock.
    let rendezvous = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [0b01u32, 0b10u32]
        .into_iter()
        .map(|mask| {
            let lock = Arc::clone(&lock);
            let rendezvous = Arc::clone(&rendezvous);
            thread::spawn(move || {
                let _guard = lock.lock(mask);
                rendezvous.wait();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_conflicting_requests_granted_in_fifo_order() {
    let lock = Arc::new(MrLock::new(8));
    let order = Arc::new(Mutex::new(Vec::new()));

    let holder = lock.lock(0b1);

    // Stagger the requesters so their tickets are taken in id order while
    // the holder keeps them all queued.
    let mut handles = Vec::new();
    for id in 0..4 {
        let lock = Arc::clone(&lock);
        let order = Arc::clone(&order);
        handles.push(thread::spawn(move || {
            let _guard = lock.lock(0b1);
            order.lock().unwrap().push(id);
        }));
        thread::sleep(Duration::from_millis(40));
    }
    drop(holder);

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn test_second_disjoint_acquisition_while_holding() {
    let lock = MrLock::new(8);
    let outer = lock.lock(0b100);
    let inner = lock.lock(0b010);
    drop(inner);
    drop(outer);
}
