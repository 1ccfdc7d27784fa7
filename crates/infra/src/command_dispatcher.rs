//! Command execution pipeline (application-level orchestration).
//!
//! One command cycle, for any event-sourced aggregate:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream from the store
//!   ↓
//! 2. Rehydrate (shared replay fold over the history)
//!   ↓
//! 3. Handle command (pure decision logic, produces events or rejects)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed envelopes to the bus
//! ```
//!
//! A rejected command stops at step 3 and nothing is appended. Under
//! [`ConcurrencyControl::Serialized`] steps 1–5 run under the aggregate's
//! stream lock; under `Optimistic` a racing writer makes step 4 fail with
//! [`CommandError::ConcurrentModification`]. Errors are never retried here.
//!
//! The dispatcher keeps no aggregate state between calls; every command
//! re-derives state from the store.

use thiserror::Error;

use ledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use ledger_events::{Command, Event, EventBus, EventEnvelope};

use crate::config::ConcurrencyControl;
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::locks::StreamLocks;

/// Caller-facing command failure.
///
/// Every variant means the store was left unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    #[error("aggregate already exists: {0}")]
    AlreadyExists(String),

    /// Another writer appended between our read and our append.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("event store error: {0}")]
    Store(EventStoreError),
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidAmount(amount) => CommandError::InvalidAmount(amount),
            DomainError::InsufficientBalance { balance, requested } => {
                CommandError::InsufficientBalance { balance, requested }
            }
            DomainError::AlreadyExists(id) => CommandError::AlreadyExists(id),
            DomainError::UnknownAggregate(id) => CommandError::UnknownAggregate(id),
            DomainError::Validation(msg) => CommandError::Validation(msg),
            DomainError::InvariantViolation(msg) => CommandError::InvariantViolation(msg),
            DomainError::Conflict(msg) => CommandError::ConcurrentModification(msg),
        }
    }
}

impl From<EventStoreError> for CommandError {
    fn from(value: EventStoreError) -> Self {
        if matches!(value, EventStoreError::Concurrency { .. }) {
            return CommandError::ConcurrentModification(value.to_string());
        }
        CommandError::Store(value)
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store `S` and bus `B`, so tests run against the
/// in-memory implementations and nothing in here performs IO itself.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    concurrency: ConcurrencyControl,
    locks: StreamLocks,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self::with_concurrency(store, bus, ConcurrencyControl::default())
    }

    pub fn with_concurrency(store: S, bus: B, concurrency: ConcurrencyControl) -> Self {
        Self {
            store,
            bus,
            concurrency,
            locks: StreamLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn concurrency(&self) -> ConcurrencyControl {
        self.concurrency
    }

    /// Dispatch a command through the full pipeline.
    ///
    /// `make_aggregate` builds the empty aggregate that history is folded
    /// into; it is where callers inject per-aggregate policy.
    ///
    /// Returns the committed events (with sequence numbers). A command that
    /// decides no events commits nothing and returns an empty vector.
    pub fn dispatch<A>(
        &self,
        command: A::Command,
        make_aggregate: impl FnOnce(&AggregateId) -> A,
    ) -> Result<Vec<StoredEvent<A::Event>>, CommandError>
    where
        A: Aggregate<Error = DomainError>,
        A::Command: Command,
        A::Event: Event,
        S: EventStore<A::Event>,
        B: EventBus<EventEnvelope<A::Event>>,
    {
        let aggregate_id = command.target_aggregate_id().clone();

        match self.concurrency {
            // Publishing under the stream lock keeps envelopes for one id in
            // sequence order on the bus.
            ConcurrencyControl::Serialized => {
                self.locks
                    .with_lock(&aggregate_id, || -> Result<_, CommandError> {
                        let committed = self.run_cycle(&aggregate_id, &command, make_aggregate)?;
                        self.publish(&committed);
                        Ok(committed)
                    })
            }
            // Concurrent commits may reach the bus out of order; projections
            // hold back envelopes that arrive ahead of their cursor.
            ConcurrencyControl::Optimistic => {
                let committed = self.run_cycle(&aggregate_id, &command, make_aggregate)?;
                self.publish(&committed);
                Ok(committed)
            }
        }
    }

    /// Rebuild an aggregate from its stream without handling any command.
    pub fn load<A>(
        &self,
        aggregate_id: &AggregateId,
        make_aggregate: impl FnOnce(&AggregateId) -> A,
    ) -> Result<A, CommandError>
    where
        A: Aggregate,
        A::Event: Event,
        S: EventStore<A::Event>,
    {
        let history = self.store.read(aggregate_id);
        validate_loaded_stream(aggregate_id, &history)?;
        Ok(rehydrate(make_aggregate(aggregate_id), &history))
    }

    fn run_cycle<A>(
        &self,
        aggregate_id: &AggregateId,
        command: &A::Command,
        make_aggregate: impl FnOnce(&AggregateId) -> A,
    ) -> Result<Vec<StoredEvent<A::Event>>, CommandError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event,
        S: EventStore<A::Event>,
    {
        // 1) Load history
        let history = self.store.read(aggregate_id);
        validate_loaded_stream(aggregate_id, &history)?;
        let loaded_version = stream_version(&history);

        // 2) Rehydrate aggregate
        let aggregate = rehydrate(make_aggregate(aggregate_id), &history);

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(command).map_err(|err| {
            tracing::info!(
                aggregate_id = %aggregate_id,
                version = aggregate.version(),
                error = %err,
                "command rejected"
            );
            CommandError::from(err)
        })?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let committed = self
            .store
            .append_expected(decided, ExpectedVersion::Exact(loaded_version))
            .inspect_err(|err| {
                tracing::info!(aggregate_id = %aggregate_id, error = %err, "append rejected");
            })?;

        tracing::debug!(
            aggregate_id = %aggregate_id,
            from_version = loaded_version,
            to_version = loaded_version + committed.len() as u64,
            events = committed.len(),
            "command committed"
        );

        Ok(committed)
    }

    /// Fan committed events out to subscribers.
    ///
    /// The append already succeeded and is authoritative, so a failed publish
    /// is logged rather than reported as a command failure; read models catch
    /// up through a rebuild.
    fn publish<E>(&self, committed: &[StoredEvent<E>])
    where
        E: Event,
        B: EventBus<EventEnvelope<E>>,
    {
        for stored in committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::error!(
                    aggregate_id = %stored.aggregate_id,
                    sequence_number = stored.sequence_number,
                    error = ?err,
                    "event publication failed after append"
                );
            }
        }
    }
}

fn stream_version<E>(stream: &[StoredEvent<E>]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn rehydrate<A>(aggregate: A, history: &[StoredEvent<A::Event>]) -> A
where
    A: Aggregate,
{
    ledger_core::replay(aggregate, history.iter().map(|stored| &stored.event))
}

/// Reject streams a buggy backend could return: foreign events, or positions
/// that are not exactly 1..=n in order.
fn validate_loaded_stream<E>(
    aggregate_id: &AggregateId,
    stream: &[StoredEvent<E>],
) -> Result<(), CommandError> {
    for (idx, e) in stream.iter().enumerate() {
        if &e.aggregate_id != aggregate_id {
            return Err(CommandError::Store(EventStoreError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        let expected = idx as u64 + 1;
        if e.sequence_number != expected {
            return Err(CommandError::Store(EventStoreError::CorruptStream(format!(
                "expected sequence_number {expected}, found {}",
                e.sequence_number
            ))));
        }
    }
    Ok(())
}
