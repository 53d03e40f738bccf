//! Queue-based multi-resource lock.
//!
//! # Request lifecycle
//!
//! Requests live in a fixed ring of cells, each holding a sequence number
//! and the requested resource mask:
//!
//! ```text
//!   acquire(mask):                       release(pos):
//!   1. pos = fetch_add(tail)             1. cells[pos].mask = 0
//!   2. wait cells[pos].seq == pos        2. advance head over released
//!   3. cells[pos].mask = mask               cells, recycling each one
//!   4. scan [head, pos): wait until         (mask = FULL, seq += ring len)
//!      every earlier conflicting
//!      request has departed
//! ```
//!
//! A cell whose slot has been claimed (step 1) but not yet published
//! (step 3) still carries the all-ones mask from recycling, so scanners
//! conservatively treat it as conflicting until its real mask appears. A
//! cell whose sequence number has moved past the scanner's position has
//! departed and is skipped.
//!
//! FIFO fairness follows from the ticket order: a request only waits on
//! requests with earlier tickets, never on later ones.

use std::hint;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Mask recycled cells carry so unpublished requests read as conflicting.
const FULL_MASK: u32 = u32::MAX;

struct Cell {
    seq: AtomicUsize,
    mask: AtomicU32,
}

/// A FIFO lock over up to 32 resources, one bit each.
///
/// `capacity` bounds the number of in-flight requests (acquired or
/// waiting); it is rounded up to a power of two.
pub struct MrLock {
    cells: Box<[CachePadded<Cell>]>,
    index_mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

impl MrLock {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(2);
        let cells = (0..capacity)
            .map(|i| {
                CachePadded::new(Cell {
                    seq: AtomicUsize::new(i),
                    mask: AtomicU32::new(FULL_MASK),
                })
            })
            .collect();
        MrLock {
            cells,
            index_mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire every resource in `resources`, blocking (spinning) until no
    /// earlier conflicting request remains.
    ///
    /// The guard releases on drop. Holding a guard and acquiring a second,
    /// disjoint mask is allowed; overlapping self-acquisition deadlocks,
    /// as it would with any non-reentrant lock.
    pub fn lock(&self, resources: u32) -> MrGuard<'_> {
        let pos = self.tail.fetch_add(1, Ordering::Relaxed);
        let cell = &self.cells[pos & self.index_mask];

        // Wait for our slot to be recycled from the previous lap.
        while cell.seq.load(Ordering::Acquire) != pos {
            hint::spin_loop();
        }
        cell.mask.store(resources, Ordering::Release);

        // Wait until every earlier conflicting request has departed.
        let mut spin = self.head.load(Ordering::Acquire);
        while spin != pos {
            let other = &self.cells[spin & self.index_mask];
            if other.seq.load(Ordering::Acquire) > spin
                || other.mask.load(Ordering::Acquire) & resources == 0
            {
                spin += 1;
            } else {
                hint::spin_loop();
            }
        }
        MrGuard { lock: self, pos }
    }

    fn unlock(&self, pos: usize) {
        let lap = self.cells.len();
        self.cells[pos & self.index_mask]
            .mask
            .store(0, Ordering::Release);

        // Advance head over released requests, recycling their slots for
        // the next lap.
        loop {
            let head = self.head.load(Ordering::Acquire);
            let cell = &self.cells[head & self.index_mask];
            if cell.seq.load(Ordering::Acquire) != head || cell.mask.load(Ordering::Acquire) != 0 {
                break;
            }
            if self
                .head
                .compare_exchange(head, head + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                cell.mask.store(FULL_MASK, Ordering::Release);
                cell.seq.store(head + lap, Ordering::Release);
            }
        }
    }
}

/// Holds the resources granted by [`MrLock::lock`] until dropped.
pub struct MrGuard<'a> {
    lock: &'a MrLock,
    pos: usize,
}

impl Drop for MrGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock(self.pos);
    }
}
