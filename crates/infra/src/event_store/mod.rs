//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id. The store is a trusted, dumb log: it
//! orders and numbers events but never checks business rules.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent};
