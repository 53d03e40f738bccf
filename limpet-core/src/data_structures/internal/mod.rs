pub(crate) mod arena;
pub(crate) mod durable_set;
pub(crate) mod marked_ptr;
pub(crate) mod state_ptr;

pub(crate) use arena::NodeArena;
pub(crate) use marked_ptr::MarkedPtr;
pub(crate) use state_ptr::{NodeState, StatePtr};
