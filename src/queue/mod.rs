//! Queue Module
//!
//! Durable FIFO of writes made while offline, replayed in per-resource order.

mod item;
mod store;

#[cfg(test)]
mod property_tests;

pub use item::{ItemStatus, Operation, ParseEnumError, QueueItem, SyncStatus};
pub use store::{DuplicatePolicy, SyncQueue};
