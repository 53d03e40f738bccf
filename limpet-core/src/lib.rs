//! Durably linearizable concurrent sets over simulated persistent memory.
//!
//! Five list-based set variants share one persistence protocol: every
//! operation that returns `true` has flushed the corresponding persistent
//! cell first, so a crash between any two stores loses only operations that
//! had not yet reported success.

pub mod common_tests;
pub mod data_structures;

// Re-export the set family for convenience
pub use data_structures::{
    DurableSet, LinkFreeDurableSet, LockDurableSet, MrLockDurableSet, SequentialDurableSet,
    SoftDurableSet,
};
