//! Account command handler: the ledger's in-process API surface.
//!
//! | Operation | Effect |
//! |---|---|
//! | `create_account(id, owner)` | appends `AccountCreated` |
//! | `deposit(id, amount)` | appends `MoneyDeposited` |
//! | `withdraw(id, amount)` | appends `MoneyWithdrawn` or rejects |
//! | `project(id)` | returns the replayed `{owner, balance}` view |

use std::sync::Arc;

use ledger_accounts::{Account, AccountCommand, AccountEvent, AccountId, AccountPolicy, AccountProjection};
use ledger_events::{EventBus, EventEnvelope, InMemoryEventBus};

use crate::command_dispatcher::{CommandDispatcher, CommandError};
use crate::config::LedgerConfig;
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};

/// In-memory store shared between the handler and readers.
pub type InMemoryAccountStore = Arc<InMemoryEventStore<AccountEvent>>;
/// In-memory bus carrying committed account envelopes.
pub type InMemoryAccountBus = Arc<InMemoryEventBus<EventEnvelope<AccountEvent>>>;

/// Drives account commands through the dispatcher with the configured policy.
///
/// The store is injected, never global; callers keep their own handle to it
/// (e.g. an `Arc`) to read streams directly.
#[derive(Debug)]
pub struct AccountCommandHandler<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    policy: AccountPolicy,
}

impl<S, B> AccountCommandHandler<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self::with_config(store, bus, LedgerConfig::default())
    }

    pub fn with_config(store: S, bus: B, config: LedgerConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::with_concurrency(store, bus, config.concurrency),
            policy: config.policy,
        }
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub fn bus(&self) -> &B {
        self.dispatcher.bus()
    }

    pub fn config(&self) -> LedgerConfig {
        LedgerConfig {
            policy: self.policy,
            concurrency: self.dispatcher.concurrency(),
        }
    }
}

impl AccountCommandHandler<InMemoryAccountStore, InMemoryAccountBus> {
    /// Handler over a fresh in-memory store and bus.
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::with_config(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            config,
        )
    }
}

impl<S, B> AccountCommandHandler<S, B>
where
    S: EventStore<AccountEvent>,
    B: EventBus<EventEnvelope<AccountEvent>>,
{
    #[tracing::instrument(skip_all, fields(account_id = %id))]
    pub fn create_account(
        &self,
        id: &AccountId,
        owner: impl Into<String>,
    ) -> Result<StoredEvent<AccountEvent>, CommandError> {
        self.execute(AccountCommand::create(id.clone(), owner))
    }

    #[tracing::instrument(skip_all, fields(account_id = %id, amount = amount))]
    pub fn deposit(&self, id: &AccountId, amount: i64) -> Result<StoredEvent<AccountEvent>, CommandError> {
        self.execute(AccountCommand::deposit(id.clone(), amount))
    }

    #[tracing::instrument(skip_all, fields(account_id = %id, amount = amount))]
    pub fn withdraw(&self, id: &AccountId, amount: i64) -> Result<StoredEvent<AccountEvent>, CommandError> {
        self.execute(AccountCommand::withdraw(id.clone(), amount))
    }

    /// Run any account command; every account command commits exactly one event.
    pub fn execute(&self, command: AccountCommand) -> Result<StoredEvent<AccountEvent>, CommandError> {
        let name = command.name();
        let policy = self.policy;
        let committed = self
            .dispatcher
            .dispatch(command, |id| Account::with_policy(AccountId::new(id.clone()), policy))?;

        committed.into_iter().next().ok_or_else(|| {
            CommandError::InvariantViolation(format!("{name} committed no events"))
        })
    }

    /// Replay the account's stream into its read view.
    ///
    /// With `require_existing`, an id with no creation event is
    /// `UnknownAggregate`; otherwise it projects as `{owner: None, balance: 0}`.
    #[tracing::instrument(skip_all, fields(account_id = %id))]
    pub fn project(&self, id: &AccountId) -> Result<AccountProjection, CommandError> {
        let policy = self.policy;
        let account = self
            .dispatcher
            .load(id.as_aggregate_id(), |aggregate_id| {
                Account::with_policy(AccountId::new(aggregate_id.clone()), policy)
            })?;

        if policy.require_existing && !account.is_created() {
            return Err(CommandError::UnknownAggregate(id.to_string()));
        }

        Ok(account.projection())
    }

    /// Raw stream for an account, in append order.
    pub fn history(&self, id: &AccountId) -> Vec<StoredEvent<AccountEvent>> {
        self.store().read(id.as_aggregate_id())
    }
}
