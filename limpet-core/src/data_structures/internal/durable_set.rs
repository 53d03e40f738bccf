use limpet_storage::Payload;

/// An ordered set of keyed items whose successful operations survive a
/// crash of the process.
///
/// # Contract
///
/// - Keys live in the open interval `(MIN_KEY, MAX_KEY)`; at most one item
///   per key.
/// - `insert`/`remove` returning `true` implies the matching persistent
///   cell was flushed before the return.
/// - `owner` identifies the calling thread; each owner draws nodes and
///   durable cells only from its own pre-sized arena. An exhausted arena
///   makes every further `insert` by that owner return `false`.
/// - `recover` and the inspection methods assume quiescence: no operation
///   may be in flight.
pub trait DurableSet<T: Payload> {
    /// Insert `key`. `false` means already present, arena exhausted, or
    /// aborted.
    fn insert(&self, key: i64, item: T, owner: usize) -> bool;

    /// `true` iff `key` is in the set at some point during the call.
    fn contains(&self, key: i64) -> bool;

    /// Remove `key`. `false` means not present or aborted.
    fn remove(&self, key: i64, owner: usize) -> bool;

    /// Rebuild the volatile list from the durable cells: scan and reset the
    /// store, tear the list down, resize each owner's arena to
    /// `write_ops[owner]` plus its recovered node count, and replay the
    /// recovered items.
    fn recover(&mut self, write_ops: &[usize]);

    /// Ordered member keys at a quiescent point.
    fn to_vec(&self) -> Vec<i64>;

    /// Number of members at a quiescent point.
    fn len(&self) -> usize {
        self.to_vec().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys the volatile list held when `recover` last ran (diagnostics).
    fn volatile_recovered(&self) -> &[i64];

    /// Keys the durable scan produced when `recover` last ran (diagnostics).
    fn durable_recovered(&self) -> &[i64];
}
