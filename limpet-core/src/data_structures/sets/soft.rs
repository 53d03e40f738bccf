//! SOFT durable set.
//!
//! Ordering lives in the volatile list; durability lives in a persistent
//! twin node per volatile node. The volatile node's lifecycle is encoded in
//! the two low bits of its own successor pointer, so state and successor
//! change as one atomic word:
//!
//! ```text
//!   IntendToInsert -> Inserted -> IntendToDelete -> Deleted
//! ```
//!
//! The linearization point of `insert` is the CAS that links the node (or,
//! on the help path, the first CAS to `Inserted`); of `remove`, the first
//! CAS to `IntendToDelete`. `contains` performs no writes at all - no
//! helping, no flushing.

use std::sync::atomic::{fence, AtomicBool, AtomicI64, AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;

use limpet_storage::{Payload, SoftStore};

use crate::data_structures::internal::durable_set::DurableSet;
use crate::data_structures::internal::{NodeArena, NodeState, StatePtr};
use crate::data_structures::{MAX_KEY, MIN_KEY};

/// Persistent twin of a volatile node. `create` brackets the payload with
/// `valid_start`/`valid_end`; `destroy` sets `deleted`. Either one flushes.
struct PNode {
    key: AtomicI64,
    item: AtomicU64,
    valid_start: AtomicBool,
    valid_end: AtomicBool,
    deleted: AtomicBool,
    // Durable address, written by the owner before publication.
    owner: usize,
    cell: usize,
}

impl PNode {
    fn blank() -> Self {
        PNode {
            key: AtomicI64::new(0),
            item: AtomicU64::new(0),
            valid_start: AtomicBool::new(false),
            valid_end: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            owner: 0,
            cell: 0,
        }
    }

    fn flush<T: Payload>(&self, store: &SoftStore<T>) {
        store.flush(
            self.key.load(Ordering::Relaxed),
            T::from_word(self.item.load(Ordering::Relaxed)),
            self.valid_start.load(Ordering::Relaxed),
            self.valid_end.load(Ordering::Relaxed),
            self.deleted.load(Ordering::Relaxed),
            self.owner,
            self.cell,
        );
    }

    /// Concurrent helpers may all run this; every write is idempotent.
    fn create<T: Payload>(&self, key: i64, item: T, store: &SoftStore<T>) {
        self.valid_start.store(true, Ordering::Relaxed);
        fence(Ordering::Release);
        self.key.store(key, Ordering::Relaxed);
        self.item.store(item.to_word(), Ordering::Relaxed);
        self.valid_end.store(true, Ordering::Release);
        self.flush(store);
    }

    fn destroy<T: Payload>(&self, store: &SoftStore<T>) {
        self.deleted.store(true, Ordering::Release);
        self.flush(store);
    }
}

struct Node<T> {
    // Written by the owner before publication, immutable afterwards.
    key: i64,
    item: T,
    pnode: PNode,
    // Low two bits carry this node's own lifecycle state.
    next: AtomicPtr<Node<T>>,
}

impl<T: Payload> Node<T> {
    fn blank() -> Self {
        Node {
            key: 0,
            item: T::default(),
            pnode: PNode::blank(),
            next: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    fn state(&self) -> NodeState {
        StatePtr::new(self.next.load(Ordering::Acquire)).state()
    }
}

struct FindResult<T> {
    /// Tagged word whose reference is the predecessor.
    previous: *mut Node<T>,
    /// Tagged word whose reference is the first node with key >= target.
    current: *mut Node<T>,
    current_state: NodeState,
}

pub struct SoftDurableSet<T: Payload> {
    head: *mut Node<T>,
    tail_one: *mut Node<T>,
    tail_two: *mut Node<T>,
    store: Arc<SoftStore<T>>,
    abort: Arc<AtomicBool>,
    arena: NodeArena<Node<T>>,
    volatile_recovered: Vec<i64>,
    durable_recovered: Vec<i64>,
}

// Safety: the sentinel pointers are written only at construction and during
// the exclusive recover; all shared mutation goes through the nodes'
// atomics.
unsafe impl<T: Payload> Send for SoftDurableSet<T> {}
unsafe impl<T: Payload> Sync for SoftDurableSet<T> {}

impl<T: Payload> SoftDurableSet<T> {
    /// Will not be called concurrently. One arena slice per entry of
    /// `write_ops`.
    pub fn new(store: Arc<SoftStore<T>>, abort: Arc<AtomicBool>, write_ops: &[usize]) -> Self {
        let arena = NodeArena::new(write_ops, Node::blank);
        let (head, tail_one, tail_two) = Self::new_sentinels();
        SoftDurableSet {
            head,
            tail_one,
            tail_two,
            store,
            abort,
            arena,
            volatile_recovered: Vec::new(),
            durable_recovered: Vec::new(),
        }
    }

    /// Two tail sentinels: the second guarantees the first always has a
    /// valid successor to carry its state bits.
    fn new_sentinels() -> (*mut Node<T>, *mut Node<T>, *mut Node<T>) {
        let head = Box::into_raw(Box::new(Node::blank()));
        let tail_one = Box::into_raw(Box::new(Node::blank()));
        let tail_two = Box::into_raw(Box::new(Node::blank()));
        unsafe {
            (*head).key = MIN_KEY;
            (*tail_one).key = MAX_KEY;
            (*tail_two).key = MAX_KEY + 1;
            (*tail_one).next.store(
                StatePtr::pack(tail_two, NodeState::Inserted),
                Ordering::Relaxed,
            );
            (*head).next.store(
                StatePtr::pack(tail_one, NodeState::Inserted),
                Ordering::Relaxed,
            );
        }
        (head, tail_one, tail_two)
    }

    /// Tie the owner's current free node to its durable cell and stage the
    /// payload. Nothing is consumed until `commit_alloc`.
    fn alloc_from_arena(&self, key: i64, item: T, owner: usize) -> Option<*mut Node<T>> {
        let node = self.arena.peek(owner)?;
        let cell = self.store.retrieve_address(owner)?;
        unsafe {
            (*node).pnode.owner = owner;
            (*node).pnode.cell = cell;
            (*node).key = key;
            (*node).item = item;
        }
        Some(node)
    }

    fn commit_alloc(&self, owner: usize) {
        self.arena.advance(owner);
        self.store.update_address(owner);
    }

    /// CAS `node.next` from (successor, `old`) to (successor, `new`),
    /// leaving the successor reference fixed.
    fn state_cas(&self, node: *mut Node<T>, old: NodeState, new: NodeState) -> bool {
        unsafe {
            let successor = StatePtr::unmask((*node).next.load(Ordering::Acquire));
            (*node)
                .next
                .compare_exchange(
                    StatePtr::pack(successor, old),
                    StatePtr::pack(successor, new),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        }
    }

    /// Swing the predecessor past a `Deleted` current, keeping the
    /// predecessor's own state bits. Failure is ignored.
    fn trim(&self, previous: *mut Node<T>, current: *mut Node<T>) -> bool {
        let previous_state = StatePtr::new(current).state();
        let previous_ref = StatePtr::unmask(previous);
        let current_ref = StatePtr::unmask(current);
        unsafe {
            let successor = (*current_ref).next.load(Ordering::Acquire);
            let successor_ref = StatePtr::unmask(successor);
            (*previous_ref)
                .next
                .compare_exchange(
                    current,
                    StatePtr::pack(successor_ref, previous_state),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        }
    }

    /// Walk the list trimming `Deleted` nodes; stop at the first reference
    /// whose key >= `key`.
    fn find(&self, key: i64) -> FindResult<T> {
        unsafe {
            let mut previous: *mut Node<T> = self.head;
            let mut previous_ref = StatePtr::new(previous).as_ptr();
            let mut current = (*previous_ref).next.load(Ordering::Acquire);
            let mut current_ref = StatePtr::new(current).as_ptr();
            loop {
                let successor = (*current_ref).next.load(Ordering::Acquire);
                let current_state = StatePtr::new(successor).state();
                if current_state != NodeState::Deleted {
                    if (*current_ref).key >= key {
                        return FindResult {
                            previous,
                            current,
                            current_state,
                        };
                    }
                    previous = current;
                    previous_ref = current_ref;
                    current = (*previous_ref).next.load(Ordering::Acquire);
                } else {
                    self.trim(previous, current);
                    current = (*previous_ref).next.load(Ordering::Acquire);
                }
                current_ref = StatePtr::new(current).as_ptr();
            }
        }
    }

    fn free_sentinels(&mut self) {
        // Safety: created by new_sentinels, freed once; callers hold &mut
        // so no traversal is in flight.
        unsafe {
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail_one));
            drop(Box::from_raw(self.tail_two));
        }
    }

    /// Link phase of `insert`: everything up to (not including) the publish
    /// of the persistent twin. Returns the node to publish and whether this
    /// call linked it, or `None` when the key is already fully present or
    /// the arena is exhausted.
    fn link_for_insert(&self, key: i64, item: T, owner: usize) -> Option<(*mut Node<T>, bool)> {
        loop {
            if self.abort.load(Ordering::Acquire) {
                return None;
            }
            let found = self.find(key);
            let previous_ref = StatePtr::unmask(found.previous);
            let current_ref = StatePtr::unmask(found.current);
            let previous_state = StatePtr::new(found.current).state();
            unsafe {
                if (*current_ref).key == key {
                    if found.current_state != NodeState::IntendToInsert {
                        return None;
                    }
                    // Another inserter linked it but has not finished
                    // publishing; help it through the publish phase.
                    return Some((current_ref, false));
                }
                let new_node = self.alloc_from_arena(key, item, owner)?;
                (*new_node).next.store(
                    StatePtr::pack(current_ref, NodeState::IntendToInsert),
                    Ordering::Relaxed,
                );
                if (*previous_ref)
                    .next
                    .compare_exchange(
                        found.current,
                        StatePtr::pack(new_node, previous_state),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_err()
                {
                    continue;
                }
                // Linearization point (success path)
                self.commit_alloc(owner);
                return Some((new_node, true));
            }
        }
    }

    /// Publish phase: make the twin durable, then advance the state to
    /// `Inserted`. Safe to run from any number of helpers.
    fn publish(&self, node: *mut Node<T>) {
        unsafe {
            (*node)
                .pnode
                .create((*node).key, (*node).item, &self.store);
            while (*node).state() == NodeState::IntendToInsert {
                self.state_cas(node, NodeState::IntendToInsert, NodeState::Inserted);
            }
        }
    }
}

impl<T: Payload> DurableSet<T> for SoftDurableSet<T> {
    fn insert(&self, key: i64, item: T, owner: usize) -> bool {
        debug_assert!(key > MIN_KEY && key < MAX_KEY);
        let Some((node, linked)) = self.link_for_insert(key, item, owner) else {
            return false;
        };
        self.publish(node);
        linked
    }

    fn contains(&self, key: i64) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            let mut current_ref = StatePtr::unmask((*self.head).next.load(Ordering::Acquire));
            while (*current_ref).key < key {
                current_ref = StatePtr::unmask((*current_ref).next.load(Ordering::Acquire));
            }
            if (*current_ref).key != key {
                return false;
            }
            let state = (*current_ref).state();
            state != NodeState::Deleted && state != NodeState::IntendToInsert
        }
    }

    fn remove(&self, key: i64, _owner: usize) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        let found = self.find(key);
        let current_ref = StatePtr::unmask(found.current);
        unsafe {
            if (*current_ref).key != key {
                return false;
            }
            if found.current_state == NodeState::IntendToInsert {
                return false;
            }

            // The first CAS to IntendToDelete wins the removal.
            let mut result = false;
            while !result && (*current_ref).state() == NodeState::Inserted {
                result = self.state_cas(current_ref, NodeState::Inserted, NodeState::IntendToDelete);
                // Linearization point when the CAS succeeds
            }

            // Help make the delete durable, winner or not, then retire the
            // state.
            (*current_ref).pnode.destroy(&self.store);
            while (*current_ref).state() == NodeState::IntendToDelete {
                self.state_cas(current_ref, NodeState::IntendToDelete, NodeState::Deleted);
            }

            if result {
                self.trim(found.previous, found.current);
            }
            result
        }
    }

    fn recover(&mut self, write_ops: &[usize]) {
        debug_assert_eq!(write_ops.len(), self.arena.num_owners());
        let recovered = self.store.read_reset_memory();

        // Snapshot the volatile list, skipping Deleted nodes (diagnostics).
        self.volatile_recovered.clear();
        unsafe {
            let mut current_ref = StatePtr::unmask((*self.head).next.load(Ordering::Acquire));
            while (*current_ref).key < MAX_KEY {
                if (*current_ref).state() != NodeState::Deleted {
                    self.volatile_recovered.push((*current_ref).key);
                }
                current_ref = StatePtr::unmask((*current_ref).next.load(Ordering::Acquire));
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
        let (head, tail_one, tail_two) = Self::new_sentinels();
        self.head = head;
        self.tail_one = tail_one;
        self.tail_two = tail_two;

        // Replay; the list is ordered, so replay order cannot matter.
        for i in 0..recovered.total() {
            self.insert(recovered.keys[i], recovered.items[i], recovered.owners[i]);
        }
    }

    fn to_vec(&self) -> Vec<i64> {
        let mut keys = Vec::new();
        unsafe {
            let mut current_ref = StatePtr::unmask((*self.head).next.load(Ordering::Acquire));
            while (*current_ref).key < MAX_KEY {
                let state = (*current_ref).state();
                if state == NodeState::Inserted || state == NodeState::IntendToDelete {
                    keys.push((*current_ref).key);
                }
                current_ref = StatePtr::unmask((*current_ref).next.load(Ordering::Acquire));
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

impl<T: Payload> Drop for SoftDurableSet<T> {
    fn drop(&mut self) {
        self.free_sentinels();
        // Arena nodes are freed by the arena itself.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_set(write_ops: &[usize], max_ops: usize) -> SoftDurableSet<i64> {
        let store = Arc::new(SoftStore::new(write_ops.len(), max_ops));
        SoftDurableSet::new(store, Arc::new(AtomicBool::new(false)), write_ops)
    }

    #[test]
    fn test_unpublished_insert_is_invisible() {
        let set = new_set(&[4], 4);

        // Stop the insert right after the link CAS: the node is reachable
        // but still IntendToInsert, so contains must not observe it.
        let (node, linked) = set.link_for_insert(7, 7, 0).unwrap();
        assert!(linked);
        assert!(!set.contains(7));

        // Any thread can complete the publish; afterwards the key is
        // visible and durable.
        set.publish(node);
        assert!(set.contains(7));
        assert_eq!(set.store.read_reset_memory().keys, vec![7]);
    }

    #[test]
    fn test_remove_of_unpublished_insert_fails() {
        let set = new_set(&[4], 4);

        let (node, _) = set.link_for_insert(3, 3, 0).unwrap();
        assert!(!set.remove(3, 0));

        set.publish(node);
        assert!(set.remove(3, 0));
    }

    #[test]
    fn test_second_tail_carries_first_tails_state() {
        let set = new_set(&[1], 1);
        unsafe {
            assert_eq!((*set.tail_one).state(), NodeState::Inserted);
            assert_eq!((*set.tail_two).key, MAX_KEY + 1);
        }
    }
}
