//! Reusable test suites run against every durable set variant.
//!
//! Integration tests provide a marker type per variant implementing
//! [`SetFactory`] and feed it to the generic suites, so each variant runs
//! the same semantic checks.


use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::data_structures::DurableSet;

/// Construction seam: durable sets need a store and an abort flag, so the
/// suites build instances through a factory instead of `Default`.
pub trait SetFactory {
    type Set: DurableSet<i64>;

    /// A set with one arena slice per entry of `write_ops`, each owner's
    /// store section sized `max_ops`, sharing the caller's cancellation
    /// token.
    fn create_with_abort(
        write_ops: &[usize],
        max_ops: usize,
        abort: Arc<AtomicBool>,
    ) -> Self::Set;

    /// Same, with a token nobody ever sets.
    fn create(write_ops: &[usize], max_ops: usize) -> Self::Set {
        Self::create_with_abort(write_ops, max_ops, Arc::new(AtomicBool::new(false)))
    }
}
