//! Infrastructure layer: event store, command pipeline, config, read models.

pub mod account_handler;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod locks;
pub mod projections;

mod integration_tests;

pub use account_handler::{AccountCommandHandler, InMemoryAccountBus, InMemoryAccountStore};
pub use command_dispatcher::{CommandDispatcher, CommandError};
pub use config::{ConcurrencyControl, ConfigError, LedgerConfig};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
pub use locks::StreamLocks;
pub use projections::AccountSummaryProjection;
