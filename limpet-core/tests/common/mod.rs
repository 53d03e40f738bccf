//! Marker types wiring each set variant into the shared test suites.
#![allow(dead_code)] // not every test binary exercises every variant

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use limpet_core::common_tests::SetFactory;
use limpet_core::{
    LinkFreeDurableSet, LockDurableSet, MrLockDurableSet, SequentialDurableSet, SoftDurableSet,
};
use limpet_storage::{PersistentStore, SoftStore};

pub struct UseLinkFree;
pub struct UseSoft;
pub struct UseLock;
pub struct UseMrLock;
pub struct UseSequential;

impl SetFactory for UseLinkFree {
    type Set = LinkFreeDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(PersistentStore::new(write_ops.len(), max_ops));
        LinkFreeDurableSet::new(store, abort, write_ops)
    }
}

impl SetFactory for UseSoft {
    type Set = SoftDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(SoftStore::new(write_ops.len(), max_ops));
        SoftDurableSet::new(store, abort, write_ops)
    }
}

impl SetFactory for UseLock {
    type Set = LockDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(PersistentStore::new(write_ops.len(), max_ops));
        LockDurableSet::new(store, abort, write_ops)
    }
}

impl SetFactory for UseMrLock {
    type Set = MrLockDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(PersistentStore::new(write_ops.len(), max_ops));
        MrLockDurableSet::new(store, abort, write_ops)
    }
}

impl SetFactory for UseSequential {
    type Set = SequentialDurableSet<i64>;

    fn create_with_abort(write_ops: &[usize], max_ops: usize, abort: Arc<AtomicBool>) -> Self::Set {
        let store = Arc::new(PersistentStore::new(1, max_ops));
        SequentialDurableSet::new(store, abort, write_ops[0])
    }
}
