//! Fine-grained lock durable set.
//!
//! `insert` and `remove` traverse without locks, then take the predecessor's
//! and current node's mutexes in list order and validate that the window is
//! still intact (`previous.next == current`, current not logically deleted);
//! a failed validation releases both locks and restarts. Deadlock freedom
//! follows from the strict key-order acquisition. `contains` is lock-free
//! and treats a marked successor as absent.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};

use limpet_storage::{Payload, PersistentStore};

use crate::data_structures::internal::durable_set::DurableSet;
use crate::data_structures::internal::{MarkedPtr, NodeArena};
use crate::data_structures::{MAX_KEY, MIN_KEY};

const PREPARED: u32 = 0b01;
const COMMITTED: u32 = 0b10;

struct Node<T> {
    key: i64,
    item: T,
    // Mutated only under the node's mutex.
    valid_bits: u32,
    // Atomic because the lock-free contains reads it while writers hold
    // only the mutexes.
    next: AtomicPtr<Node<T>>,
    mutex: Mutex<()>,
    owner: usize,
    cell: usize,
}

impl<T: Payload> Node<T> {
    fn blank() -> Self {
        Node {
            key: 0,
            item: T::default(),
            valid_bits: 0,
            next: AtomicPtr::new(std::ptr::null_mut()),
            mutex: Mutex::new(()),
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

    /// Copy the node into its cell; the successor word at flush time
    /// carries the delete mark, so one flush serves inserts and removes.
    fn flush(&self, store: &PersistentStore<T>) {
        store.flush(
            self.key,
            self.item,
            self.valid_bits,
            self.next.load(Ordering::Acquire) as usize,
            self.owner,
            self.cell,
        );
    }
}

pub struct LockDurableSet<T: Payload> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
    store: Arc<PersistentStore<T>>,
    abort: Arc<AtomicBool>,
    arena: NodeArena<Node<T>>,
    volatile_recovered: Vec<i64>,
    durable_recovered: Vec<i64>,
}

// Safety: the sentinel pointers are written only at construction and during
// the exclusive recover; list mutation happens under the node mutexes and
// the successor pointers are atomic for the lock-free readers.
unsafe impl<T: Payload> Send for LockDurableSet<T> {}
unsafe impl<T: Payload> Sync for LockDurableSet<T> {}

impl<T: Payload> LockDurableSet<T> {
    /// Will not be called concurrently. One arena slice per entry of
    /// `write_ops`.
    pub fn new(
        store: Arc<PersistentStore<T>>,
        abort: Arc<AtomicBool>,
        write_ops: &[usize],
    ) -> Self {
        let arena = NodeArena::new(write_ops, Node::blank);
        let (head, tail) = Self::new_sentinels();
        LockDurableSet {
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

    /// Lock-free traversal; returns the first node with key >= `key` and
    /// its predecessor. The window must be validated under locks.
    fn find(&self, key: i64) -> (*mut Node<T>, *mut Node<T>) {
        unsafe {
            let mut previous = self.head;
            let mut current = (*previous).next_ref();
            while (*current).key < key {
                previous = current;
                current = (*current).next_ref();
            }
            (previous, current)
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

impl<T: Payload> DurableSet<T> for LockDurableSet<T> {
    fn insert(&self, key: i64, item: T, owner: usize) -> bool {
        debug_assert!(key > MIN_KEY && key < MAX_KEY);
        loop {
            if self.abort.load(Ordering::Acquire) {
                return false;
            }
            let (previous, current) = self.find(key);
            unsafe {
                let _previous_guard = (*previous).mutex.lock().unwrap();
                let _current_guard = (*current).mutex.lock().unwrap();

                // Validate the window is still intact.
                if (*previous).next.load(Ordering::Acquire) != current || (*current).next_marked() {
                    continue;
                }
                if (*current).key == key {
                    return false;
                }
                let Some(new_node) = self.alloc_from_arena(owner) else {
                    return false; // No memory available
                };
                (*new_node).valid_bits |= PREPARED;
                (*new_node).key = key;
                (*new_node).item = item;
                (*new_node).next.store(current, Ordering::Relaxed);
                (*previous).next.store(new_node, Ordering::Release);
                self.commit_alloc(owner);
                (*new_node).valid_bits |= COMMITTED;
                (*new_node).flush(&self.store);
                return true;
            }
        }
    }

    fn contains(&self, key: i64) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            let mut current = (*self.head).next_ref();
            while (*current).key < key {
                current = (*current).next_ref();
            }
            (*current).key == key && !(*current).next_marked()
        }
    }

    fn remove(&self, key: i64, _owner: usize) -> bool {
        loop {
            if self.abort.load(Ordering::Acquire) {
                return false;
            }
            let (previous, current) = self.find(key);
            unsafe {
                let _previous_guard = (*previous).mutex.lock().unwrap();
                let _current_guard = (*current).mutex.lock().unwrap();

                if (*previous).next.load(Ordering::Acquire) != current || (*current).next_marked() {
                    continue;
                }
                if (*current).key != key {
                    return false;
                }
                // Logical delete, then unlink, then make it durable.
                let successor = (*current).next.load(Ordering::Acquire);
                (*current).next.store(
                    MarkedPtr::new(successor).with_mark().as_raw(),
                    Ordering::Release,
                );
                (*previous).next.store(successor, Ordering::Release);
                (*current).flush(&self.store);
                return true;
            }
        }
    }

    fn recover(&mut self, write_ops: &[usize]) {
        debug_assert_eq!(write_ops.len(), self.arena.num_owners());
        let recovered = self.store.read_reset_memory();

        // Snapshot the volatile list before teardown (diagnostics).
        self.volatile_recovered.clear();
        unsafe {
            let mut current = (*self.head).next_ref();
            // Only tail.next is null.
            while !(*current).next.load(Ordering::Acquire).is_null() {
                self.volatile_recovered.push((*current).key);
                current = (*current).next_ref();
            }
        }
        self.durable_recovered = recovered.keys.clone();

        // Rejuvenate, sized for the new run plus the survivors.
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
            let mut current = (*self.head).next_ref();
            while !(*current).next.load(Ordering::Acquire).is_null() {
                keys.push((*current).key);
                current = (*current).next_ref();
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

impl<T: Payload> Drop for LockDurableSet<T> {
    fn drop(&mut self) {
        self.free_sentinels();
        // Arena nodes are freed by the arena itself.
    }
}
