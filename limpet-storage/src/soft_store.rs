//! Persistent cell store for the SOFT protocol.
//!
//! SOFT persists a twin node per volatile node; durability state is the
//! `valid_start`/`valid_end` bracket written around the payload plus a
//! `deleted` flag, not validity bits and a successor word.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicIsize, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::payload::Payload;
use crate::Recovered;

struct SoftCell {
    key: AtomicI64,
    item: AtomicU64,
    valid_start: AtomicBool,
    valid_end: AtomicBool,
    deleted: AtomicBool,
}

impl SoftCell {
    fn blank() -> Self {
        SoftCell {
            key: AtomicI64::new(0),
            item: AtomicU64::new(0),
            valid_start: AtomicBool::new(false),
            valid_end: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
        }
    }

    fn copy_from(&self, key: i64, item: u64, valid_start: bool, valid_end: bool, deleted: bool) {
        self.key.store(key, Ordering::Relaxed);
        self.item.store(item, Ordering::Relaxed);
        self.valid_start.store(valid_start, Ordering::Relaxed);
        self.deleted.store(deleted, Ordering::Relaxed);
        self.valid_end.store(valid_end, Ordering::Release);
    }

    /// A cell holds a fully created, not-destroyed twin.
    fn is_valid(&self) -> bool {
        if self.deleted.load(Ordering::Acquire) {
            return false; // Cell was deleted
        }
        if !self.valid_start.load(Ordering::Relaxed) || !self.valid_end.load(Ordering::Relaxed) {
            return false; // Cell incomplete
        }
        true
    }

    fn reset(&self) {
        self.copy_from(0, 0, false, false, false);
    }
}

/// Per-owner sections of SOFT cells with descending address allocation.
pub struct SoftStore<T> {
    sections: Vec<Vec<SoftCell>>,
    free_index: Vec<CachePadded<AtomicIsize>>,
    section_size: usize,
    _payload: PhantomData<T>,
}

impl<T: Payload> SoftStore<T> {
    pub fn new(num_owners: usize, max_ops: usize) -> Self {
        let sections = (0..num_owners)
            .map(|_| (0..max_ops).map(|_| SoftCell::blank()).collect())
            .collect();
        let free_index = (0..num_owners)
            .map(|_| CachePadded::new(AtomicIsize::new(max_ops as isize - 1)))
            .collect();
        SoftStore {
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
    /// exhausted. Does not consume the address.
    pub fn retrieve_address(&self, owner: usize) -> Option<usize> {
        let index = self.free_index[owner].load(Ordering::Relaxed);
        if index < 0 {
            None
        } else {
            Some(index as usize)
        }
    }

    pub fn update_address(&self, owner: usize) {
        self.free_index[owner].fetch_sub(1, Ordering::Relaxed);
    }

    pub fn flush(
        &self,
        key: i64,
        item: T,
        valid_start: bool,
        valid_end: bool,
        deleted: bool,
        owner: usize,
        cell: usize,
    ) {
        self.sections[owner][cell].copy_from(key, item.to_word(), valid_start, valid_end, deleted);
    }

    /// Scan every cell, collect the valid ones, and zero the region.
    /// Must not be called concurrently with any operation.
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_requires_complete_bracket() {
        let store: SoftStore<i64> = SoftStore::new(1, 4);

        store.flush(1, 1, true, true, false, 0, 0); // created
        store.flush(2, 2, true, false, false, 0, 1); // torn create
        store.flush(3, 3, true, true, true, 0, 2); // destroyed

        let recovered = store.read_reset_memory();
        assert_eq!(recovered.keys, vec![1]);
        assert_eq!(recovered.active_per_owner, vec![1]);
    }

    #[test]
    fn test_reset_restores_addresses() {
        let store: SoftStore<i64> = SoftStore::new(1, 2);

        store.update_address(0);
        store.update_address(0);
        assert_eq!(store.retrieve_address(0), None);

        store.read_reset_memory();
        assert_eq!(store.retrieve_address(0), Some(1));
    }
}
