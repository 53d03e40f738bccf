//! Link-free lock-free durable set.
//!
//! Visibility and durability commit through two per-node validity bits and
//! a logical-delete mark in the successor pointer:
//!
//! ```text
//!   prepared (bit 0) -> committed (bit 1) -> delete-marked next -> trimmed
//! ```
//!
//! The linearization point of `insert` is the CAS that links the node; of
//! `remove`, the CAS that installs the mark. The flush that follows either
//! CAS makes the outcome durable before the operation returns, and any
//! thread that observes the node first helps commit and flush it, so the
//! suppression flags never gate correctness.

use std::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU32, Ordering};
use std::sync::Arc;

use limpet_storage::{Payload, PersistentStore};

use crate::data_structures::internal::durable_set::DurableSet;
use crate::data_structures::internal::{MarkedPtr, NodeArena};
use crate::data_structures::{MAX_KEY, MIN_KEY};

const PREPARED: u32 = 0b01;
const COMMITTED: u32 = 0b10;

struct Node<T> {
    // key, item and the durable address are written only by the owner,
    // before the publication CAS makes the node reachable.
    key: i64,
    item: T,
    valid_bits: AtomicU32,
    // Suppress duplicate flushes; volatile acceleration only, never
    // persisted.
    insert_flushed: AtomicBool,
    delete_flushed: AtomicBool,
    next: AtomicPtr<Node<T>>,
    owner: usize,
    cell: usize,
}

impl<T: Payload> Node<T> {
    fn blank() -> Self {
        Node {
            key: 0,
            item: T::default(),
            valid_bits: AtomicU32::new(0),
            insert_flushed: AtomicBool::new(false),
            delete_flushed: AtomicBool::new(false),
            next: AtomicPtr::new(std::ptr::null_mut()),
            owner: 0,
            cell: 0,
        }
    }

    fn next_marked(&self) -> bool {
        MarkedPtr::new(self.next.load(Ordering::Acquire)).is_marked()
    }

    fn next_ref(&self) -> *mut Node<T> {
        MarkedPtr::new(self.next.load(Ordering::Acquire)).as_ptr()
    }

    fn mark_prepared(&self) {
        self.valid_bits.fetch_or(PREPARED, Ordering::Release);
    }

    /// Idempotent commit; concurrent helpers may race the inserter here.
    fn mark_committed(&self) {
        self.valid_bits.fetch_or(COMMITTED, Ordering::Release);
    }

    fn flush_insert(&self, store: &PersistentStore<T>) {
        if !self.insert_flushed.load(Ordering::Acquire) {
            store.flush(
                self.key,
                self.item,
                self.valid_bits.load(Ordering::Acquire),
                self.next.load(Ordering::Acquire) as usize,
                self.owner,
                self.cell,
            );
            self.insert_flushed.store(true, Ordering::Release);
        }
    }

    fn flush_delete(&self, store: &PersistentStore<T>) {
        if !self.delete_flushed.load(Ordering::Acquire) {
            store.flush(
                self.key,
                self.item,
                self.valid_bits.load(Ordering::Acquire),
                self.next.load(Ordering::Acquire) as usize,
                self.owner,
                self.cell,
            );
            self.delete_flushed.store(true, Ordering::Release);
        }
    }
}

pub struct LinkFreeDurableSet<T: Payload> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
    store: Arc<PersistentStore<T>>,
    abort: Arc<AtomicBool>,
    arena: NodeArena<Node<T>>,
    volatile_recovered: Vec<i64>,
    durable_recovered: Vec<i64>,
}

// Safety: the sentinel pointers are written only at construction and during
// the exclusive recover; all shared mutation goes through the nodes'
// atomics.
unsafe impl<T: Payload> Send for LinkFreeDurableSet<T> {}
unsafe impl<T: Payload> Sync for LinkFreeDurableSet<T> {}

impl<T: Payload> LinkFreeDurableSet<T> {
    /// Will not be called concurrently. One arena slice per entry of
    /// `write_ops`.
    pub fn new(
        store: Arc<PersistentStore<T>>,
        abort: Arc<AtomicBool>,
        write_ops: &[usize],
    ) -> Self {
        let arena = NodeArena::new(write_ops, Node::blank);
        let (head, tail) = Self::new_sentinels();
        LinkFreeDurableSet {
            head,
            tail,
            store,
            abort,
            arena,
            volatile_recovered: Vec::new(),
            durable_recovered: Vec::new(),
        }
    }

    fn new_sentinels() -> (*mut Node<T>, *mut Node<T>) {
        let tail = Box::into_raw(Box::new(Node::blank()));
        let head = Box::into_raw(Box::new(Node::blank()));
        unsafe {
            (*tail).key = MAX_KEY;
            (*head).key = MIN_KEY;
            (*head).next.store(tail, Ordering::Relaxed);
        }
        (head, tail)
    }

    /// Tie the owner's current free node to its durable cell address.
    /// Neither is consumed until `commit_alloc`.
    fn alloc_from_arena(&self, owner: usize) -> Option<*mut Node<T>> {
        let node = self.arena.peek(owner)?;
        let cell = self.store.retrieve_address(owner)?;
        unsafe {
            (*node).owner = owner;
            (*node).cell = cell;
        }
        Some(node)
    }

    fn commit_alloc(&self, owner: usize) {
        self.arena.advance(owner);
        self.store.update_address(owner);
    }

    /// Physically unlink a logically deleted `current`. The delete is made
    /// durable first; CAS failure is ignored, another thread will trim.
    fn trim(&self, previous: *mut Node<T>, current: *mut Node<T>) -> bool {
        unsafe {
            (*current).flush_delete(&self.store);
            let successor = (*current).next_ref();
            (*previous)
                .next
                .compare_exchange(current, successor, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        }
    }

    /// Walk from head, trimming logically deleted nodes on the way.
    /// Returns the first node with key >= `key` and its predecessor.
    fn find(&self, key: i64) -> (*mut Node<T>, *mut Node<T>) {
        unsafe {
            let mut previous = self.head;
            let mut current = MarkedPtr::unmask((*previous).next.load(Ordering::Acquire));
            loop {
                if !(*current).next_marked() {
                    if (*current).key >= key {
                        return (previous, current);
                    }
                    previous = current;
                } else {
                    self.trim(previous, current);
                }
                current = (*current).next_ref();
            }
        }
    }

    fn free_sentinels(&mut self) {
        // Safety: created by new_sentinels, freed once; callers hold &mut
        // so no traversal is in flight.
        unsafe {
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail));
        }
    }
}

impl<T: Payload> DurableSet<T> for LinkFreeDurableSet<T> {
    fn insert(&self, key: i64, item: T, owner: usize) -> bool {
        debug_assert!(key > MIN_KEY && key < MAX_KEY);
        loop {
            if self.abort.load(Ordering::Acquire) {
                return false;
            }
            let (previous, current) = self.find(key);
            unsafe {
                if (*current).key == key {
                    // Help the pending insert become durable.
                    (*current).mark_committed();
                    (*current).flush_insert(&self.store);
                    return false;
                }
                let Some(new_node) = self.alloc_from_arena(owner) else {
                    return false; // No memory available
                };
                (*new_node).mark_prepared();
                fence(Ordering::Release);
                (*new_node).key = key;
                (*new_node).item = item;
                // Publication happens via the CAS below.
                (*new_node).next.store(current, Ordering::Relaxed);
                if (*previous)
                    .next
                    .compare_exchange(current, new_node, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    // Linearization point
                    self.commit_alloc(owner);
                    (*new_node).mark_committed();
                    (*new_node).flush_insert(&self.store);
                    return true;
                }
            }
        }
    }

    fn contains(&self, key: i64) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            let mut current = MarkedPtr::unmask((*self.head).next.load(Ordering::Acquire));
            while (*current).key < key {
                current = (*current).next_ref();
            }
            if (*current).key != key {
                return false;
            }
            if (*current).next_marked() {
                // Pending removal: help make the delete durable.
                (*current).flush_delete(&self.store);
                return false;
            }
            // Present: help make the insert durable before reporting it.
            (*current).mark_committed();
            (*current).flush_insert(&self.store);
            true
        }
    }

    fn remove(&self, key: i64, _owner: usize) -> bool {
        let mut previous;
        let mut current;
        loop {
            if self.abort.load(Ordering::Acquire) {
                return false;
            }
            let found = self.find(key);
            previous = found.0;
            current = found.1;
            unsafe {
                if (*current).key != key {
                    return false;
                }
                let successor = (*current).next_ref();
                let marked = MarkedPtr::new(successor).with_mark().as_raw();
                // Commit first: the original inserter may not have flushed
                // yet, and a removed node must replay as committed+deleted.
                (*current).mark_committed();
                if (*current)
                    .next
                    .compare_exchange(successor, marked, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    // Linearization point
                    break;
                }
            }
        }
        self.trim(previous, current);
        true
    }

    fn recover(&mut self, write_ops: &[usize]) {
        debug_assert_eq!(write_ops.len(), self.arena.num_owners());
        let recovered = self.store.read_reset_memory();

        // Snapshot the volatile list before teardown (diagnostics).
        self.volatile_recovered.clear();
        unsafe {
            let mut current = MarkedPtr::unmask((*self.head).next.load(Ordering::Acquire));
            // Only tail.next is null.
            while !(*current).next.load(Ordering::Acquire).is_null() {
                if !(*current).next_marked() {
                    self.volatile_recovered.push((*current).key);
                }
                current = (*current).next_ref();
            }
        }
        self.durable_recovered = recovered.keys.clone();

        // Rejuvenate: every node slot is reborn blank, sized for the new
        // run plus the survivors about to be replayed.
        self.free_sentinels();
        let sizes: Vec<usize> = write_ops
            .iter()
            .zip(&recovered.active_per_owner)
            .map(|(write, active)| write + active)
            .collect();
        self.arena.rebuild(&sizes, Node::blank);
        let (head, tail) = Self::new_sentinels();
        self.head = head;
        self.tail = tail;

        // Replay; the list is ordered, so replay order cannot matter.
        for i in 0..recovered.total() {
            self.insert(recovered.keys[i], recovered.items[i], recovered.owners[i]);
        }
    }

    fn to_vec(&self) -> Vec<i64> {
        let mut keys = Vec::new();
        unsafe {
            let mut previous = self.head;
            let mut current = (*previous).next.load(Ordering::Acquire);
            while !current.is_null() {
                let node = MarkedPtr::unmask(current);
                if !(*node).next_marked() {
                    if (*node).key != MAX_KEY {
                        keys.push((*node).key);
                    }
                    previous = node;
                } else {
                    // Leftover logically deleted node; trim in passing.
                    self.trim(previous, node);
                }
                current = (*node).next_ref();
            }
        }
        keys
    }

    fn volatile_recovered(&self) -> &[i64] {
        &self.volatile_recovered
    }

    fn durable_recovered(&self) -> &[i64] {
        &self.durable_recovered
    }
}

impl<T: Payload> Drop for LinkFreeDurableSet<T> {
    fn drop(&mut self) {
        self.free_sentinels();
        // Arena nodes are freed by the arena itself.
    }
}
