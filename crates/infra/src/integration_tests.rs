//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → EventBus → Projection
//!
//! Verifies:
//! - Commands produce events that update read models correctly
//! - Concurrent commands on one account never overdraw or lose updates
//! - Optimistic conflicts are surfaced and leave the store consistent
//! - History is append-only across arbitrary command sequences

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use proptest::prelude::*;

    use ledger_accounts::{AccountEvent, AccountId};
    use ledger_events::{
        EventBus, EventEnvelope, InMemoryBusError, InMemoryEventBus, Projection, Subscription,
    };

    use crate::account_handler::{AccountCommandHandler, InMemoryAccountBus, InMemoryAccountStore};
    use crate::command_dispatcher::CommandError;
    use crate::config::{ConcurrencyControl, LedgerConfig};
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::AccountSummaryProjection;

    type Handler = AccountCommandHandler<InMemoryAccountStore, InMemoryAccountBus>;

    fn id(value: &str) -> AccountId {
        AccountId::parse(value).unwrap()
    }

    fn handler(concurrency: ConcurrencyControl) -> Arc<Handler> {
        Arc::new(AccountCommandHandler::in_memory(LedgerConfig {
            concurrency,
            ..LedgerConfig::default()
        }))
    }

    fn assert_gapless(handler: &Handler, account: &AccountId) {
        for (idx, stored) in handler.history(account).iter().enumerate() {
            assert_eq!(stored.sequence_number, idx as u64 + 1);
        }
    }

    #[test]
    fn subscriber_thread_keeps_read_model_in_sync() {
        let handler = handler(ConcurrencyControl::Serialized);
        let projection = Arc::new(Mutex::new(AccountSummaryProjection::new()));

        // Subscribe BEFORE any events are published.
        let subscription = handler.bus().subscribe();
        let projection_clone = projection.clone();
        let worker = std::thread::spawn(move || {
            let mut seen = 0;
            while seen < 3 {
                match subscription.recv_timeout(Duration::from_secs(5)) {
                    Ok(envelope) => {
                        projection_clone.lock().unwrap().apply(&envelope);
                        seen += 1;
                    }
                    Err(_) => break,
                }
            }
        });

        let a1 = id("acc-123");
        handler.create_account(&a1, "Alice").unwrap();
        handler.deposit(&a1, 100).unwrap();
        handler.withdraw(&a1, 50).unwrap();
        worker.join().unwrap();

        let summary = projection.lock().unwrap().get(&a1).unwrap();
        assert_eq!(summary, handler.project(&a1).unwrap());
        assert_eq!(summary.balance, 50);
    }

    #[test]
    fn serialized_withdrawals_never_overdraw() {
        let handler = handler(ConcurrencyControl::Serialized);
        let a1 = id("a1");
        handler.create_account(&a1, "Alice").unwrap();
        handler.deposit(&a1, 1_000).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (handler, a1) = (handler.clone(), a1.clone());
                std::thread::spawn(move || {
                    let mut ok = 0;
                    for _ in 0..20 {
                        match handler.withdraw(&a1, 10) {
                            Ok(_) => ok += 1,
                            Err(CommandError::InsufficientBalance { .. }) => {}
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                    ok
                })
            })
            .collect();
        let succeeded: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

        assert_eq!(succeeded, 100);
        assert_eq!(handler.project(&a1).unwrap().balance, 0);
        assert_eq!(handler.history(&a1).len(), 102);
        assert_gapless(&handler, &a1);
    }

    #[test]
    fn optimistic_deposits_lose_no_committed_update() {
        let handler = handler(ConcurrencyControl::Optimistic);
        let a1 = id("a1");
        handler.create_account(&a1, "Alice").unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (handler, a1) = (handler.clone(), a1.clone());
                std::thread::spawn(move || {
                    let mut committed = 0i64;
                    for _ in 0..25 {
                        match handler.deposit(&a1, 3) {
                            Ok(_) => committed += 3,
                            Err(CommandError::ConcurrentModification(_)) => {}
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                    committed
                })
            })
            .collect();
        let committed: i64 = workers.into_iter().map(|w| w.join().unwrap()).sum();

        assert!(committed > 0);
        assert_eq!(handler.project(&a1).unwrap().balance, committed);
        assert_eq!(handler.history(&a1).len() as i64, 1 + committed / 3);
        assert_gapless(&handler, &a1);
    }

    #[test]
    fn different_accounts_progress_in_parallel() {
        let handler = handler(ConcurrencyControl::Serialized);
        let ids: Vec<AccountId> = (0..6).map(|n| id(&format!("acc-{n}"))).collect();
        for account in &ids {
            handler.create_account(account, "Owner").unwrap();
        }

        let workers: Vec<_> = ids
            .iter()
            .cloned()
            .map(|account| {
                let handler = handler.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        handler.deposit(&account, 2).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        for account in &ids {
            assert_eq!(handler.project(account).unwrap().balance, 100);
            assert_gapless(&handler, account);
        }
        assert_eq!(handler.store().aggregate_ids().len(), 6);
    }

    type Envelope = EventEnvelope<AccountEvent>;

    /// Holds every published envelope and delivers them newest-first on `release`.
    #[derive(Default)]
    struct ReversingBus {
        inner: InMemoryEventBus<Envelope>,
        held: Mutex<Vec<Envelope>>,
    }

    impl ReversingBus {
        fn release(&self) {
            let held = std::mem::take(&mut *self.held.lock().unwrap());
            for envelope in held.into_iter().rev() {
                self.inner.publish(envelope).unwrap();
            }
        }
    }

    impl EventBus<Envelope> for ReversingBus {
        type Error = InMemoryBusError;

        fn publish(&self, message: Envelope) -> Result<(), Self::Error> {
            self.held.lock().unwrap().push(message);
            Ok(())
        }

        fn subscribe(&self) -> Subscription<Envelope> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn read_model_converges_when_envelopes_arrive_out_of_order() {
        let handler = AccountCommandHandler::with_config(
            Arc::new(InMemoryEventStore::<AccountEvent>::new()),
            Arc::new(ReversingBus::default()),
            LedgerConfig::default(),
        );
        let subscription = handler.bus().subscribe();
        let a1 = id("a1");
        handler.create_account(&a1, "Alice").unwrap();
        handler.deposit(&a1, 100).unwrap();
        handler.deposit(&a1, 10).unwrap();
        handler.withdraw(&a1, 1).unwrap();

        handler.bus().release();
        let mut projection = AccountSummaryProjection::new();
        assert_eq!(projection.drain(&subscription), 4);

        assert_eq!(projection.pending(), 0);
        assert_eq!(projection.cursor(&a1), 4);
        assert_eq!(projection.get(&a1), Some(handler.project(&a1).unwrap()));
    }

    fn live_projection_matches_store_under_contention(concurrency: ConcurrencyControl) {
        let handler = handler(concurrency);
        let subscription = handler.bus().subscribe();
        let a1 = id("a1");
        handler.create_account(&a1, "Alice").unwrap();
        handler.deposit(&a1, 500).unwrap();

        let workers: Vec<_> = (0..8i64)
            .map(|n| {
                let (handler, a1) = (handler.clone(), a1.clone());
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let _ = if n % 2 == 0 {
                            handler.deposit(&a1, n + 1)
                        } else {
                            handler.withdraw(&a1, n)
                        };
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let mut projection = AccountSummaryProjection::new();
        projection.drain(&subscription);

        assert_eq!(projection.pending(), 0);
        assert_eq!(projection.cursor(&a1), handler.history(&a1).len() as u64);
        assert_eq!(projection.get(&a1), Some(handler.project(&a1).unwrap()));
    }

    #[test]
    fn live_projection_matches_store_under_serialized_contention() {
        live_projection_matches_store_under_contention(ConcurrencyControl::Serialized);
    }

    #[test]
    fn live_projection_matches_store_under_optimistic_contention() {
        live_projection_matches_store_under_contention(ConcurrencyControl::Optimistic);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(i64),
        Withdraw(i64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-5i64..500).prop_map(Op::Deposit),
            (-5i64..500).prop_map(Op::Withdraw),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Any command sequence leaves earlier events untouched, grows the
        /// stream only on success, and agrees with a plain balance model.
        #[test]
        fn command_sequences_are_append_only(ops in prop::collection::vec(arb_op(), 0..40)) {
            let handler = handler(ConcurrencyControl::Serialized);
            let a1 = id("a1");
            handler.create_account(&a1, "Alice").unwrap();
            let mut model = 0i64;

            for op in ops {
                let before = handler.history(&a1);
                let result = match op {
                    Op::Deposit(amount) => handler.deposit(&a1, amount),
                    Op::Withdraw(amount) => handler.withdraw(&a1, amount),
                };
                let after = handler.history(&a1);

                prop_assert_eq!(&after[..before.len()], &before[..]);
                match result {
                    Ok(stored) => {
                        prop_assert_eq!(after.len(), before.len() + 1);
                        prop_assert_eq!(after.last(), Some(&stored));
                        model += stored.event.balance_delta();
                    }
                    Err(_) => prop_assert_eq!(after.len(), before.len()),
                }
                prop_assert!(model >= 0);
            }

            prop_assert_eq!(handler.project(&a1).unwrap().balance, model);
        }
    }
}
