//! Per-owner pre-allocated node arenas.
//!
//! Every node a set will ever link is constructed up front, one slice of
//! slots per owner, and handed out through a descending free index. Slots
//! are never recycled within a run; since an address is never reissued,
//! the lists need no hazard pointers or epochs to dodge ABA. The arena
//! keeps ownership of every node it created - linked or not - and frees
//! them in bulk on drop or rebuild.

use std::sync::atomic::{AtomicIsize, Ordering};

use crossbeam_utils::CachePadded;

pub(crate) struct NodeArena<N> {
    slots: Vec<Vec<*mut N>>,
    free_index: Vec<CachePadded<AtomicIsize>>,
}

// Safety: the raw slot pointers are created from Box and freed exactly once,
// by this arena; concurrent access to the nodes themselves is governed by
// the owning set's protocol (each owner allocates only from its own slice).
unsafe impl<N: Send> Send for NodeArena<N> {}
unsafe impl<N: Send + Sync> Sync for NodeArena<N> {}

impl<N> NodeArena<N> {
    pub(crate) fn new(write_ops: &[usize], mut make: impl FnMut() -> N) -> Self {
        let slots = write_ops
            .iter()
            .map(|&count| {
                (0..count)
                    .map(|_| Box::into_raw(Box::new(make())))
                    .collect()
            })
            .collect();
        let free_index = write_ops
            .iter()
            .map(|&count| CachePadded::new(AtomicIsize::new(count as isize - 1)))
            .collect();
        NodeArena { slots, free_index }
    }

    pub(crate) fn num_owners(&self) -> usize {
        self.slots.len()
    }

    /// The owner's current free slot, `None` once its slice is exhausted.
    /// Does not consume the slot.
    pub(crate) fn peek(&self, owner: usize) -> Option<*mut N> {
        let index = self.free_index[owner].load(Ordering::Relaxed);
        if index < 0 {
            None
        } else {
            Some(self.slots[owner][index as usize])
        }
    }

    /// Consume the owner's current slot after a successful insert. Only the
    /// owner thread advances its own index.
    pub(crate) fn advance(&self, owner: usize) {
        self.free_index[owner].fetch_sub(1, Ordering::Relaxed);
    }

    /// Free every node and re-allocate with new per-owner sizes.
    ///
    /// Exclusive: nothing may hold pointers into the old arena.
    pub(crate) fn rebuild(&mut self, write_ops: &[usize], make: impl FnMut() -> N) {
        *self = Self::new(write_ops, make);
    }
}

impl<N> Drop for NodeArena<N> {
    fn drop(&mut self) {
        for slice in self.slots.drain(..) {
            for node in slice {
                // Safety: created by Box::into_raw in new, freed once here.
                unsafe {
                    drop(Box::from_raw(node));
                }
            }
        }
    }
}
