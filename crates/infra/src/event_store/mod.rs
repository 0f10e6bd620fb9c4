//! Append-only event store boundary.
//!
//! Every transfer owns one stream. The store is the source of truth; the
//! in-memory transfer snapshots in [`crate::transfer_store`] can always be
//! rebuilt from it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
