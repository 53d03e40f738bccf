//! Multi-resource lock: one acquisition covers a whole bitmask of resources.
//!
//! Requests whose masks are disjoint hold the lock concurrently; requests
//! whose masks overlap are serialized in FIFO order.

pub mod mrlock;

pub use mrlock::{MrGuard, MrLock};
