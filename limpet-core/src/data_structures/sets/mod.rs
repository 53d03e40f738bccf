//! The durable set variants.
//!
//! All five share the key space, the per-owner arena discipline, and the
//! rule that a `true` return happens after the matching cell was flushed;
//! they differ in how visibility and durability are committed:
//!
//! - [`link_free`] - lock-free, validity bits + delete mark in the
//!   successor pointer
//! - [`soft`] - lock-free, lifecycle state in the successor pointer,
//!   durability in a persistent twin node
//! - [`lock_set`] - per-node mutexes, hand-over-hand
//! - [`mrlock_set`] - one multi-resource lock over per-node mask bits
//! - [`sequential`] - single-owner oracle

pub mod link_free;
pub mod lock_set;
pub mod mrlock_set;
pub mod sequential;
pub mod soft;
