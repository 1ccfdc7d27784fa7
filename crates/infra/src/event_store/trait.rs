use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use ledger_core::{AggregateId, ExpectedVersion};
use ledger_events::{Event, EventEnvelope};
use std::sync::Arc;

/// An event in an append-only stream, with its assigned position.
///
/// Sequence numbers are:
/// - **1-based and gapless**: the n-th event appended to a stream gets `n`
/// - **Stream-scoped**: each aggregate id has its own sequence
/// - **Immutable**: once assigned, never changed
///
/// The sequence number of the last event is the stream's version, which is
/// what optimistic concurrency checks compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,

    /// Position in the aggregate stream (1-based).
    pub sequence_number: u64,
    pub recorded_at: DateTime<Utc>,

    pub event: E,
}

impl<E: Clone> StoredEvent<E> {
    /// Convert a stored event into an envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<E> {
        EventEnvelope::new(
            self.event_id,
            self.aggregate_id.clone(),
            self.sequence_number,
            self.recorded_at,
            self.event.clone(),
        )
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** (concurrency, malformed batches) as
/// opposed to domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: expected {expected:?}, found {actual}")]
    Concurrency {
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("corrupt stream: {0}")]
    CorruptStream(String),
}

/// Append-only event store, one stream per aggregate id.
///
/// ## Append semantics
///
/// - `append()` is unconditional and total: the event lands at the end of the
///   stream named by `event.aggregate_id()`, creating it if needed.
/// - `append_expected()` appends a batch atomically if, and only if, the
///   stream's current version satisfies `expected`. All events in the batch
///   must target the same stream.
///
/// Appends to the same stream are linearised; their order is the causal order
/// replay relies on. Streams never shrink and stored events are never mutated.
///
/// ## Read semantics
///
/// `read()` returns a copy of the stream in append order, or an empty vector
/// for an unknown id. Callers can never reach the store's internal state.
pub trait EventStore<E: Event>: Send + Sync {
    /// Append a single event without a version check.
    fn append(&self, event: E) -> StoredEvent<E>;

    /// Append a batch under an optimistic concurrency expectation.
    fn append_expected(
        &self,
        events: Vec<E>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent<E>>, EventStoreError>;

    /// Load the full stream for an aggregate.
    fn read(&self, aggregate_id: &AggregateId) -> Vec<StoredEvent<E>>;

    /// Current version (event count) of a stream; 0 when it does not exist.
    fn stream_version(&self, aggregate_id: &AggregateId) -> u64 {
        self.read(aggregate_id)
            .last()
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }

    /// Every aggregate id that has at least one event.
    fn aggregate_ids(&self) -> Vec<AggregateId>;
}

impl<E, S> EventStore<E> for Arc<S>
where
    E: Event,
    S: EventStore<E> + ?Sized,
{
    fn append(&self, event: E) -> StoredEvent<E> {
        (**self).append(event)
    }

    fn append_expected(
        &self,
        events: Vec<E>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent<E>>, EventStoreError> {
        (**self).append_expected(events, expected)
    }

    fn read(&self, aggregate_id: &AggregateId) -> Vec<StoredEvent<E>> {
        (**self).read(aggregate_id)
    }

    fn stream_version(&self, aggregate_id: &AggregateId) -> u64 {
        (**self).stream_version(aggregate_id)
    }

    fn aggregate_ids(&self) -> Vec<AggregateId> {
        (**self).aggregate_ids()
    }
}
