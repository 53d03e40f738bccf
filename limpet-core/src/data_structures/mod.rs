//! Durable set variants and their internals.
//!
//! # Organization
//!
//! - [`sets`] - The set variants (link-free, SOFT, lock-based, MRLock,
//!   sequential)
//! - [`internal`] - Tagged pointers, node arenas, the `DurableSet` trait
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use limpet_core::{DurableSet, LinkFreeDurableSet};
//! use limpet_storage::PersistentStore;
//!
//! let store = Arc::new(PersistentStore::new(4, 1000));
//! let abort = Arc::new(AtomicBool::new(false));
//! let set: LinkFreeDurableSet<i64> = LinkFreeDurableSet::new(store, abort, &[1000; 4]);
//! set.insert(42, 42, 0);
//! ```

// Submodules
pub(crate) mod internal;
pub mod sets;

// Re-exports for convenience
pub use sets::link_free::LinkFreeDurableSet;
pub use sets::lock_set::LockDurableSet;
pub use sets::mrlock_set::MrLockDurableSet;
pub use sets::sequential::SequentialDurableSet;
pub use sets::soft::SoftDurableSet;

// Tagged pointers stay pub(crate) - truly internal implementation detail.
pub use internal::durable_set::DurableSet;

/// Sentinel key bounds. Stored keys live in the open interval
/// `(MIN_KEY, MAX_KEY)`; the sentinels themselves are never removed or
/// re-keyed.
pub(crate) const MIN_KEY: i64 = -100_000;
pub(crate) const MAX_KEY: i64 = 100_000;
