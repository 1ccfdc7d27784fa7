use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use ledger_core::{AggregateId, ExpectedVersion};
use ledger_events::Event;

use super::r#trait::{EventStore, EventStoreError, StoredEvent};

/// In-memory append-only event store.
///
/// Lives for the process lifetime: no eviction, no compaction. A single
/// `RwLock` guards the stream map, so appends (to any stream) are linearised
/// while reads proceed in parallel.
///
/// Lock poisoning is recovered rather than surfaced. Every mutation is a plain
/// `Vec::push` of a fully-built event, so a panicking holder cannot leave a
/// stream half-written.
#[derive(Debug)]
pub struct InMemoryEventStore<E> {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent<E>>>>,
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl<E: Event> InMemoryEventStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all streams.
    pub fn total_events(&self) -> usize {
        self.streams_read().values().map(Vec::len).sum()
    }

    fn streams_read(&self) -> RwLockReadGuard<'_, HashMap<AggregateId, Vec<StoredEvent<E>>>> {
        self.streams.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn streams_write(&self) -> RwLockWriteGuard<'_, HashMap<AggregateId, Vec<StoredEvent<E>>>> {
        self.streams.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(stream: &mut Vec<StoredEvent<E>>, event: E) -> StoredEvent<E> {
        let stored = StoredEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: event.aggregate_id().clone(),
            sequence_number: stream.len() as u64 + 1,
            recorded_at: Utc::now(),
            event,
        };
        stream.push(stored.clone());
        stored
    }
}

impl<E: Event> EventStore<E> for InMemoryEventStore<E> {
    fn append(&self, event: E) -> StoredEvent<E> {
        let mut streams = self.streams_write();
        let stream = streams.entry(event.aggregate_id().clone()).or_default();
        Self::push(stream, event)
    }

    fn append_expected(
        &self,
        events: Vec<E>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent<E>>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same stream.
        let aggregate_id = first.aggregate_id().clone();
        if let Some(idx) = events.iter().position(|e| e.aggregate_id() != &aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }

        let mut streams = self.streams_write();
        let current = streams
            .get(&aggregate_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0);

        if !expected.matches(current) {
            return Err(EventStoreError::Concurrency {
                expected,
                actual: current,
            });
        }

        let stream = streams.entry(aggregate_id).or_default();
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            committed.push(Self::push(stream, e));
        }

        Ok(committed)
    }

    fn read(&self, aggregate_id: &AggregateId) -> Vec<StoredEvent<E>> {
        self.streams_read()
            .get(aggregate_id)
            .cloned()
            .unwrap_or_default()
    }

    fn stream_version(&self, aggregate_id: &AggregateId) -> u64 {
        self.streams_read()
            .get(aggregate_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0)
    }

    fn aggregate_ids(&self) -> Vec<AggregateId> {
        let mut ids: Vec<AggregateId> = self.streams_read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_accounts::{AccountCreated, AccountEvent, AccountId, MoneyDeposited};
    use std::sync::Arc;

    fn account(id: &str) -> AccountId {
        AccountId::parse(id).unwrap()
    }

    fn created(id: &str, owner: &str) -> AccountEvent {
        AccountEvent::AccountCreated(AccountCreated {
            account_id: account(id),
            owner: owner.to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn deposited(id: &str, amount: i64) -> AccountEvent {
        AccountEvent::MoneyDeposited(MoneyDeposited {
            account_id: account(id),
            amount,
            occurred_at: Utc::now(),
        })
    }

    fn agg(id: &str) -> AggregateId {
        AggregateId::new(id).unwrap()
    }

    #[test]
    fn read_of_unknown_stream_is_empty() {
        let store = InMemoryEventStore::<AccountEvent>::new();
        assert!(store.read(&agg("missing")).is_empty());
        assert_eq!(store.stream_version(&agg("missing")), 0);
    }

    #[test]
    fn append_assigns_gapless_sequence_numbers_in_order() {
        let store = InMemoryEventStore::new();
        store.append(created("a1", "Alice"));
        store.append(deposited("a1", 10));
        store.append(deposited("a1", 20));

        let stream = store.read(&agg("a1"));
        let seqs: Vec<u64> = stream.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(stream[2].event.amount(), Some(20));
        assert_eq!(store.stream_version(&agg("a1")), 3);
    }

    #[test]
    fn read_is_idempotent() {
        let store = InMemoryEventStore::new();
        store.append(created("a1", "Alice"));
        store.append(deposited("a1", 10));

        assert_eq!(store.read(&agg("a1")), store.read(&agg("a1")));
    }

    #[test]
    fn streams_are_isolated() {
        let store = InMemoryEventStore::new();
        store.append(created("b1", "Bob"));
        let before = store.read(&agg("b1"));

        store.append(created("a1", "Alice"));
        store.append(deposited("a1", 5));

        assert_eq!(store.read(&agg("b1")), before);
        assert_eq!(store.aggregate_ids(), vec![agg("a1"), agg("b1")]);
        assert_eq!(store.total_events(), 3);
    }

    #[test]
    fn returned_streams_are_copies() {
        let store = InMemoryEventStore::new();
        store.append(created("a1", "Alice"));

        let mut copy = store.read(&agg("a1"));
        copy.clear();

        assert_eq!(store.read(&agg("a1")).len(), 1);
    }

    #[test]
    fn expected_version_mismatch_is_rejected_and_appends_nothing() {
        let store = InMemoryEventStore::new();
        store.append(created("a1", "Alice"));

        let err = store
            .append_expected(vec![deposited("a1", 10)], ExpectedVersion::Exact(0))
            .unwrap_err();

        assert_eq!(
            err,
            EventStoreError::Concurrency {
                expected: ExpectedVersion::Exact(0),
                actual: 1
            }
        );
        assert_eq!(store.stream_version(&agg("a1")), 1);
    }

    #[test]
    fn expected_version_match_appends_batch() {
        let store = InMemoryEventStore::new();
        let committed = store
            .append_expected(
                vec![created("a1", "Alice"), deposited("a1", 10)],
                ExpectedVersion::NoStream,
            )
            .unwrap();

        assert_eq!(committed.len(), 2);
        assert_eq!(committed[1].sequence_number, 2);
        assert_eq!(store.read(&agg("a1")), committed);
    }

    #[test]
    fn mixed_stream_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let err = store
            .append_expected(
                vec![created("a1", "Alice"), created("b1", "Bob")],
                ExpectedVersion::Any,
            )
            .unwrap_err();

        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.aggregate_ids().is_empty());
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let store = InMemoryEventStore::<AccountEvent>::new();
        let committed = store
            .append_expected(vec![], ExpectedVersion::Exact(42))
            .unwrap();
        assert!(committed.is_empty());
    }

    #[test]
    fn concurrent_appends_to_one_stream_stay_gapless() {
        let store = Arc::new(InMemoryEventStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.append(deposited("a1", 1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stream = store.read(&agg("a1"));
        assert_eq!(stream.len(), 400);
        for (idx, e) in stream.iter().enumerate() {
            assert_eq!(e.sequence_number, idx as u64 + 1);
        }
    }

    #[test]
    fn envelope_carries_stream_metadata() {
        let store = InMemoryEventStore::new();
        let stored = store.append(created("a1", "Alice"));
        let envelope = stored.to_envelope();

        assert_eq!(envelope.event_id(), stored.event_id);
        assert_eq!(envelope.aggregate_id(), &agg("a1"));
        assert_eq!(envelope.sequence_number(), 1);
        assert_eq!(envelope.payload(), &stored.event);
    }
}
