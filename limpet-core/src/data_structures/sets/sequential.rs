//! Sequential durable set.
//!
//! Single-owner oracle for the concurrent variants: no locks, no atomics,
//! the same persistence protocol (prepare bit, commit bit, flush). The
//! owner argument of the shared trait is meaningless here and ignored;
//! the store is always addressed as owner 0.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use limpet_storage::{Payload, PersistentStore};

use crate::data_structures::internal::durable_set::DurableSet;
use crate::data_structures::internal::{MarkedPtr, NodeArena};
use crate::data_structures::{MAX_KEY, MIN_KEY};

const PREPARED: u32 = 0b01;
const COMMITTED: u32 = 0b10;

const OWNER: usize = 0;

struct Node<T> {
    key: i64,
    item: T,
    valid_bits: u32,
    next: Cell<*mut Node<T>>,
    cell: usize,
}

impl<T: Payload> Node<T> {
    fn blank() -> Self {
        Node {
            key: 0,
            item: T::default(),
            valid_bits: 0,
            next: Cell::new(std::ptr::null_mut()),
            cell: 0,
        }
    }

    fn next_ref(&self) -> *mut Node<T> {
        MarkedPtr::new(self.next.get()).as_ptr()
    }

    /// Copy the node into its cell; the successor word at flush time
    /// carries the delete mark, so one flush serves inserts and removes.
    fn flush(&self, store: &PersistentStore<T>) {
        store.flush(
            self.key,
            self.item,
            self.valid_bits,
            self.next.get() as usize,
            OWNER,
            self.cell,
        );
    }
}

pub struct SequentialDurableSet<T: Payload> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
    store: Arc<PersistentStore<T>>,
    abort: Arc<AtomicBool>,
    arena: NodeArena<Node<T>>,
    volatile_recovered: Vec<i64>,
    durable_recovered: Vec<i64>,
}

impl<T: Payload> SequentialDurableSet<T> {
    pub fn new(store: Arc<PersistentStore<T>>, abort: Arc<AtomicBool>, max_write_ops: usize) -> Self {
        let arena = NodeArena::new(&[max_write_ops], Node::blank);
        let (head, tail) = Self::new_sentinels();
        SequentialDurableSet {
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
            (*head).next.set(tail);
        }
        (head, tail)
    }

    fn alloc_from_arena(&self) -> Option<*mut Node<T>> {
        let node = self.arena.peek(OWNER)?;
        let cell = self.store.retrieve_address(OWNER)?;
        unsafe {
            (*node).cell = cell;
        }
        Some(node)
    }

    fn commit_alloc(&self) {
        self.arena.advance(OWNER);
        self.store.update_address(OWNER);
    }

    fn find(&self, key: i64) -> (*mut Node<T>, *mut Node<T>) {
        unsafe {
            let mut previous = self.head;
            let mut current = (*previous).next.get();
            while (*current).key < key {
                previous = current;
                current = (*current).next.get();
            }
            (previous, current)
        }
    }

    /// Insert `key`; the owner argument of the concurrent variants does
    /// not apply.
    pub fn insert(&self, key: i64, item: T) -> bool {
        debug_assert!(key > MIN_KEY && key < MAX_KEY);
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        let (previous, current) = self.find(key);
        unsafe {
            if (*current).key == key {
                return false;
            }
            let Some(new_node) = self.alloc_from_arena() else {
                return false; // No memory available
            };
            (*new_node).valid_bits |= PREPARED;
            (*new_node).key = key;
            (*new_node).item = item;
            (*new_node).next.set(current);
            (*previous).next.set(new_node);
            self.commit_alloc();
            (*new_node).valid_bits |= COMMITTED;
            (*new_node).flush(&self.store);
        }
        true
    }

    pub fn contains(&self, key: i64) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            let mut current = (*self.head).next.get();
            while (*current).key < key {
                current = (*current).next.get();
            }
            (*current).key == key
        }
    }

    pub fn remove(&self, key: i64) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        let (previous, current) = self.find(key);
        unsafe {
            if (*current).key != key {
                return false;
            }
            let successor = (*current).next.get();
            (*current)
                .next
                .set(MarkedPtr::new(successor).with_mark().as_raw());
            (*previous).next.set(successor);
            (*current).flush(&self.store);
        }
        true
    }

    fn free_sentinels(&mut self) {
        // Safety: created by new_sentinels, freed once.
        unsafe {
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail));
        }
    }
}

impl<T: Payload> DurableSet<T> for SequentialDurableSet<T> {
    fn insert(&self, key: i64, item: T, _owner: usize) -> bool {
        SequentialDurableSet::insert(self, key, item)
    }

    fn contains(&self, key: i64) -> bool {
        SequentialDurableSet::contains(self, key)
    }

    fn remove(&self, key: i64, _owner: usize) -> bool {
        SequentialDurableSet::remove(self, key)
    }

    fn recover(&mut self, write_ops: &[usize]) {
        let max_write_ops = write_ops[OWNER];
        let recovered = self.store.read_reset_memory();

        // Snapshot the volatile list before teardown (diagnostics).
        self.volatile_recovered.clear();
        unsafe {
            let mut current = (*self.head).next.get();
            // Only tail.next is null.
            while !(*current).next.get().is_null() {
                self.volatile_recovered.push((*current).key);
                current = (*current).next_ref();
            }
        }
        self.durable_recovered = recovered.keys.clone();

        // Rejuvenate, sized for the new run plus the survivors.
        self.free_sentinels();
        let size = max_write_ops + recovered.active_per_owner[OWNER];
        self.arena.rebuild(&[size], Node::blank);
        let (head, tail) = Self::new_sentinels();
        self.head = head;
        self.tail = tail;

        // Replay; the recovered owners are all 0 here.
        for i in 0..recovered.total() {
            SequentialDurableSet::insert(self, recovered.keys[i], recovered.items[i]);
        }
    }

    fn to_vec(&self) -> Vec<i64> {
        let mut keys = Vec::new();
        unsafe {
            let mut current = (*self.head).next.get();
            while !(*current).next.get().is_null() {
                keys.push((*current).key);
                current = (*current).next.get();
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

impl<T: Payload> Drop for SequentialDurableSet<T> {
    fn drop(&mut self) {
        self.free_sentinels();
        // Arena nodes are freed by the arena itself.
    }
}
