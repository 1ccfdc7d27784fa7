//! Account summary projection: owner + balance for every account.
//!
//! Folds envelopes with the aggregate's own `apply`, so the read model can
//! never drift from what command handling sees.
//!
//! Envelopes are applied strictly in stream order per account. One that
//! arrives ahead of the cursor is held back until the gap before it fills.

use std::collections::{BTreeMap, HashMap};

use ledger_accounts::{Account, AccountEvent, AccountId, AccountPolicy, AccountProjection};
use ledger_core::Aggregate;
use ledger_events::{EventEnvelope, Projection, Subscription};

use crate::event_store::EventStore;

#[derive(Debug, Clone)]
struct Entry {
    account: Account,
    last_sequence: u64,
    pending: BTreeMap<u64, AccountEvent>,
}

impl Entry {
    fn advance(&mut self, event: &AccountEvent) {
        self.account.apply(event);
        self.last_sequence += 1;
    }

    fn apply_ready(&mut self) {
        while let Some(event) = self.pending.remove(&(self.last_sequence + 1)) {
            self.advance(&event);
        }
    }
}

/// In-memory read model of all accounts, fed from the bus or the store.
#[derive(Debug, Default)]
pub struct AccountSummaryProjection {
    accounts: HashMap<AccountId, Entry>,
}

impl AccountSummaryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AccountId) -> Option<AccountProjection> {
        self.accounts.get(id).map(|entry| entry.account.projection())
    }

    /// Last stream position applied for `id` (0 if none).
    pub fn cursor(&self, id: &AccountId) -> u64 {
        self.accounts.get(id).map(|e| e.last_sequence).unwrap_or(0)
    }

    /// Envelopes received ahead of their account's cursor and not yet applied.
    pub fn pending(&self) -> usize {
        self.accounts.values().map(|e| e.pending.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances.
    pub fn total_balance(&self) -> i64 {
        self.accounts.values().map(|e| e.account.balance()).sum()
    }

    /// Apply everything currently queued on `subscription` without blocking.
    ///
    /// Returns the number of envelopes received (including skipped duplicates).
    pub fn drain(&mut self, subscription: &Subscription<EventEnvelope<AccountEvent>>) -> usize {
        let mut received = 0;
        while let Ok(envelope) = subscription.try_recv() {
            self.apply(&envelope);
            received += 1;
        }
        received
    }

    /// Clear the read model and replay every stream in the store.
    ///
    /// Returns the number of events applied.
    pub fn rebuild<S>(&mut self, store: &S) -> usize
    where
        S: EventStore<AccountEvent>,
    {
        self.reset();

        let mut applied = 0;
        for aggregate_id in store.aggregate_ids() {
            for stored in store.read(&aggregate_id) {
                self.apply(&stored.to_envelope());
                applied += 1;
            }
        }

        tracing::info!(accounts = self.len(), events = applied, "account summaries rebuilt");
        applied
    }
}

impl Projection for AccountSummaryProjection {
    type Ev = AccountEvent;

    fn apply(&mut self, envelope: &EventEnvelope<AccountEvent>) {
        let event = envelope.payload();
        let entry = self
            .accounts
            .entry(event.account_id().clone())
            .or_insert_with(|| Entry {
                // Read side never rejects; rules were enforced when the event was decided.
                account: Account::with_policy(event.account_id().clone(), AccountPolicy::permissive()),
                last_sequence: 0,
                pending: BTreeMap::new(),
            });

        let seq = envelope.sequence_number();
        if seq <= entry.last_sequence || entry.pending.contains_key(&seq) {
            tracing::trace!(
                aggregate_id = %envelope.aggregate_id(),
                sequence_number = seq,
                "skipping already-applied envelope"
            );
            return;
        }
        if seq != entry.last_sequence + 1 {
            tracing::debug!(
                aggregate_id = %envelope.aggregate_id(),
                last = entry.last_sequence,
                found = seq,
                "holding back envelope until the stream gap fills"
            );
            entry.pending.insert(seq, event.clone());
            return;
        }

        entry.advance(event);
        entry.apply_ready();
    }

    fn reset(&mut self) {
        self.accounts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_events::EventBus;

    use crate::account_handler::AccountCommandHandler;
    use crate::config::LedgerConfig;

    fn id(value: &str) -> AccountId {
        AccountId::parse(value).unwrap()
    }

    #[test]
    fn live_feed_tracks_committed_events() {
        let handler = AccountCommandHandler::in_memory(LedgerConfig::default());
        let subscription = handler.bus().subscribe();
        let mut projection = AccountSummaryProjection::new();
        let a1 = id("a1");

        handler.create_account(&a1, "Alice").unwrap();
        handler.deposit(&a1, 100).unwrap();
        let _ = handler.withdraw(&a1, 500);
        handler.withdraw(&a1, 40).unwrap();

        assert_eq!(projection.drain(&subscription), 3);
        let summary = projection.get(&a1).unwrap();
        assert_eq!(summary.owner.as_deref(), Some("Alice"));
        assert_eq!(summary.balance, 60);
        assert_eq!(projection.cursor(&a1), 3);
    }

    #[test]
    fn duplicate_envelopes_are_ignored() {
        let handler = AccountCommandHandler::in_memory(LedgerConfig::default());
        let a1 = id("a1");
        handler.create_account(&a1, "Alice").unwrap();
        let deposit = handler.deposit(&a1, 25).unwrap();

        let mut projection = AccountSummaryProjection::new();
        projection.rebuild(handler.store());
        projection.apply(&deposit.to_envelope());
        projection.apply(&deposit.to_envelope());

        assert_eq!(projection.get(&a1).unwrap().balance, 25);
    }

    #[test]
    fn envelopes_ahead_of_cursor_wait_for_the_gap() {
        let handler = AccountCommandHandler::in_memory(LedgerConfig::default());
        let a1 = id("a1");
        let created = handler.create_account(&a1, "Alice").unwrap();
        let first = handler.deposit(&a1, 10).unwrap();
        let second = handler.deposit(&a1, 1).unwrap();

        let mut projection = AccountSummaryProjection::new();
        projection.apply(&created.to_envelope());
        projection.apply(&second.to_envelope());
        projection.apply(&second.to_envelope());

        assert_eq!(projection.cursor(&a1), 1);
        assert_eq!(projection.pending(), 1);
        assert_eq!(projection.get(&a1).unwrap().balance, 0);

        projection.apply(&first.to_envelope());

        assert_eq!(projection.cursor(&a1), 3);
        assert_eq!(projection.pending(), 0);
        assert_eq!(projection.get(&a1).unwrap().balance, 11);
    }

    #[test]
    fn rebuild_matches_per_account_projection() {
        let handler = AccountCommandHandler::in_memory(LedgerConfig::default());
        let (a1, b1) = (id("a1"), id("b1"));
        handler.create_account(&a1, "Alice").unwrap();
        handler.create_account(&b1, "Bob").unwrap();
        handler.deposit(&a1, 10).unwrap();
        handler.deposit(&b1, 7).unwrap();
        handler.withdraw(&b1, 2).unwrap();

        let mut projection = AccountSummaryProjection::new();
        let applied = projection.rebuild(handler.store());

        assert_eq!(applied, 5);
        assert_eq!(projection.len(), 2);
        assert_eq!(projection.get(&a1), Some(handler.project(&a1).unwrap()));
        assert_eq!(projection.get(&b1), Some(handler.project(&b1).unwrap()));
        assert_eq!(projection.total_balance(), 15);
    }

    #[test]
    fn rebuild_discards_previous_state() {
        let handler = AccountCommandHandler::in_memory(LedgerConfig::default());
        let mut projection = AccountSummaryProjection::new();
        let stale = handler.bus().subscribe();

        handler.create_account(&id("a1"), "Alice").unwrap();
        projection.drain(&stale);
        assert_eq!(projection.len(), 1);

        let empty = AccountCommandHandler::in_memory(LedgerConfig::default());
        assert_eq!(projection.rebuild(empty.store()), 0);
        assert!(projection.is_empty());
    }
}
