//! Persistent cell store for the validity-bits protocol.
//!
//! One cell mirrors exactly one volatile node over its lifetime. A cell is a
//! successful insert iff both validity bits are set and the persisted
//! successor word carries no logical-delete mark.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicIsize, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::payload::Payload;
use crate::Recovered;

const VALID_MASK: u32 = 0b11;
const DELETE_MARK: usize = 0b1;

/// One durable cell: the node's fields as of its latest flush.
///
/// Fields are individual atomics because helping threads may re-issue the
/// same idempotent flush concurrently; every store is a plain copy here,
/// where a real device would follow with a cache-line write-back and a store
/// fence.
struct MemCell {
    key: AtomicI64,
    item: AtomicU64,
    valid_bits: AtomicU32,
    next_raw: AtomicUsize,
}

impl MemCell {
    fn blank() -> Self {
        MemCell {
            key: AtomicI64::new(0),
            item: AtomicU64::new(0),
            valid_bits: AtomicU32::new(0),
            next_raw: AtomicUsize::new(0),
        }
    }

    fn copy_from(&self, key: i64, item: u64, valid_bits: u32, next_raw: usize) {
        self.key.store(key, Ordering::Relaxed);
        self.item.store(item, Ordering::Relaxed);
        self.next_raw.store(next_raw, Ordering::Relaxed);
        self.valid_bits.store(valid_bits, Ordering::Release);
    }

    /// A cell holds a successfully inserted, not-deleted node.
    fn is_valid(&self) -> bool {
        if self.valid_bits.load(Ordering::Acquire) & VALID_MASK != VALID_MASK {
            return false; // Cell incomplete or blank
        }
        if self.next_raw.load(Ordering::Relaxed) & DELETE_MARK != 0 {
            return false; // Cell logically deleted
        }
        true
    }

    fn reset(&self) {
        self.copy_from(0, 0, 0, 0);
    }
}

/// Per-owner sections of durable cells with descending address allocation.
pub struct PersistentStore<T> {
    sections: Vec<Vec<MemCell>>,
    free_index: Vec<CachePadded<AtomicIsize>>,
    section_size: usize,
    _payload: PhantomData<T>,
}

impl<T: Payload> PersistentStore<T> {
    pub fn new(num_owners: usize, max_ops: usize) -> Self {
        let sections = (0..num_owners)
            .map(|_| (0..max_ops).map(|_| MemCell::blank()).collect())
            .collect();
        let free_index = (0..num_owners)
            .map(|_| CachePadded::new(AtomicIsize::new(max_ops as isize - 1)))
            .collect();
        PersistentStore {
            sections,
            free_index,
            section_size: max_ops,
            _payload: PhantomData,
        }
    }

    pub fn num_owners(&self) -> usize {
        self.sections.len()
    }

    pub fn section_size(&self) -> usize {
        self.section_size
    }

    /// Current free cell index for `owner`, `None` once the section is
    /// exhausted. Does not consume the address; a failed insert must leave
    /// it untouched.
    pub fn retrieve_address(&self, owner: usize) -> Option<usize> {
        let index = self.free_index[owner].load(Ordering::Relaxed);
        if index < 0 {
            None
        } else {
            Some(index as usize)
        }
    }

    /// Consume the current address after a successful insert.
    pub fn update_address(&self, owner: usize) {
        self.free_index[owner].fetch_sub(1, Ordering::Relaxed);
    }

    /// Copy a node's state into its cell. Repeated flushes of the same node
    /// leave the cell bitwise identical.
    pub fn flush(&self, key: i64, item: T, valid_bits: u32, next_raw: usize, owner: usize, cell: usize) {
        self.sections[owner][cell].copy_from(key, item.to_word(), valid_bits, next_raw);
    }

    /// Scan every cell, collect the valid ones, and zero the region.
    ///
    /// Each owner's free index is restored to the top of its section, the
    /// same state `new` establishes. Must not be called concurrently with
    /// any operation.
    pub fn read_reset_memory(&self) -> Recovered<T> {
        let mut recovered = Recovered {
            keys: Vec::new(),
            items: Vec::new(),
            owners: Vec::new(),
            active_per_owner: vec![0; self.sections.len()],
        };
        for (owner, section) in self.sections.iter().enumerate() {
            for cell in section.iter() {
                if cell.is_valid() {
                    recovered.keys.push(cell.key.load(Ordering::Acquire));
                    recovered
                        .items
                        .push(T::from_word(cell.item.load(Ordering::Relaxed)));
                    recovered.owners.push(owner);
                    recovered.active_per_owner[owner] += 1;
                }
                cell.reset();
            }
            self.free_index[owner].store(self.section_size as isize - 1, Ordering::Relaxed);
        }
        recovered
    }

    #[cfg(test)]
    fn cell_snapshot(&self, owner: usize, cell: usize) -> (i64, u64, u32, usize) {
        let cell = &self.sections[owner][cell];
        (
            cell.key.load(Ordering::Acquire),
            cell.item.load(Ordering::Acquire),
            cell.valid_bits.load(Ordering::Acquire),
            cell.next_raw.load(Ordering::Acquire),
        )
    }
}
