use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult};
use ledger_events::{Command, Event};

use crate::policy::AccountPolicy;

/// Account identifier (one event stream per account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub AggregateId);

impl AccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Parse a caller-supplied identifier such as `"acc-123"`.
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        AggregateId::new(value).map(Self)
    }

    pub fn as_aggregate_id(&self) -> &AggregateId {
        &self.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<AggregateId> for AccountId {
    fn from(value: AggregateId) -> Self {
        Self(value)
    }
}

/// Aggregate root: Account.
///
/// Never stored. It is rebuilt on demand by folding the account's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    owner: Option<String>,
    /// Minor units (e.g. cents).
    balance: i64,
    version: u64,
    policy: AccountPolicy,
}

impl Account {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AccountId) -> Self {
        Self::with_policy(id, AccountPolicy::default())
    }

    pub fn with_policy(id: AccountId, policy: AccountPolicy) -> Self {
        Self {
            id,
            owner: None,
            balance: 0,
            version: 0,
            policy,
        }
    }

    /// Rebuild current state from an ordered event sequence.
    pub fn replay<'a>(
        id: AccountId,
        policy: AccountPolicy,
        events: impl IntoIterator<Item = &'a AccountEvent>,
    ) -> Self {
        ledger_core::replay(Self::with_policy(id, policy), events)
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn is_created(&self) -> bool {
        self.owner.is_some()
    }

    /// Read-side view of the current state.
    pub fn projection(&self) -> AccountProjection {
        AccountProjection {
            account_id: self.id.clone(),
            owner: self.owner.clone(),
            balance: self.balance,
            version: self.version,
        }
    }

    /// Validate a deposit, apply it in memory and return the resulting event.
    pub fn deposit(&mut self, amount: i64, occurred_at: DateTime<Utc>) -> DomainResult<AccountEvent> {
        let event = self.decide_deposit(amount, occurred_at)?;
        self.apply(&event);
        Ok(event)
    }

    /// Validate a withdrawal, apply it in memory and return the resulting event.
    ///
    /// On `InsufficientBalance` the aggregate is left untouched.
    pub fn withdraw(&mut self, amount: i64, occurred_at: DateTime<Utc>) -> DomainResult<AccountEvent> {
        let event = self.decide_withdraw(amount, occurred_at)?;
        self.apply(&event);
        Ok(event)
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Read model: owner + balance, re-derivable from the stream at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProjection {
    pub account_id: AccountId,
    pub owner: Option<String>,
    pub balance: i64,
    /// Number of events folded into this view.
    pub version: u64,
}

/// Command: CreateAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccount {
    pub account_id: AccountId,
    pub owner: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DepositMoney.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMoney {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawMoney.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawMoney {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    CreateAccount(CreateAccount),
    DepositMoney(DepositMoney),
    WithdrawMoney(WithdrawMoney),
}

impl AccountCommand {
    pub fn create(account_id: AccountId, owner: impl Into<String>) -> Self {
        Self::CreateAccount(CreateAccount {
            account_id,
            owner: owner.into(),
            occurred_at: Utc::now(),
        })
    }

    pub fn deposit(account_id: AccountId, amount: i64) -> Self {
        Self::DepositMoney(DepositMoney {
            account_id,
            amount,
            occurred_at: Utc::now(),
        })
    }

    pub fn withdraw(account_id: AccountId, amount: i64) -> Self {
        Self::WithdrawMoney(WithdrawMoney {
            account_id,
            amount,
            occurred_at: Utc::now(),
        })
    }

    pub fn account_id(&self) -> &AccountId {
        match self {
            AccountCommand::CreateAccount(c) => &c.account_id,
            AccountCommand::DepositMoney(c) => &c.account_id,
            AccountCommand::WithdrawMoney(c) => &c.account_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccountCommand::CreateAccount(_) => "create_account",
            AccountCommand::DepositMoney(_) => "deposit",
            AccountCommand::WithdrawMoney(_) => "withdraw",
        }
    }
}

impl Command for AccountCommand {
    fn target_aggregate_id(&self) -> &AggregateId {
        &self.account_id().0
    }
}

/// Event: AccountCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub account_id: AccountId,
    pub owner: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoneyDeposited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyDeposited {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoneyWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyWithdrawn {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    AccountCreated(AccountCreated),
    MoneyDeposited(MoneyDeposited),
    MoneyWithdrawn(MoneyWithdrawn),
}

impl AccountEvent {
    pub fn account_id(&self) -> &AccountId {
        match self {
            AccountEvent::AccountCreated(e) => &e.account_id,
            AccountEvent::MoneyDeposited(e) => &e.account_id,
            AccountEvent::MoneyWithdrawn(e) => &e.account_id,
        }
    }

    /// Amount moved by this event, if any.
    pub fn amount(&self) -> Option<i64> {
        match self {
            AccountEvent::AccountCreated(_) => None,
            AccountEvent::MoneyDeposited(e) => Some(e.amount),
            AccountEvent::MoneyWithdrawn(e) => Some(e.amount),
        }
    }

    /// Signed effect on the balance.
    pub fn balance_delta(&self) -> i64 {
        match self {
            AccountEvent::AccountCreated(_) => 0,
            AccountEvent::MoneyDeposited(e) => e.amount,
            AccountEvent::MoneyWithdrawn(e) => -e.amount,
        }
    }
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountCreated(_) => "accounts.account.created",
            AccountEvent::MoneyDeposited(_) => "accounts.account.money_deposited",
            AccountEvent::MoneyWithdrawn(_) => "accounts.account.money_withdrawn",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::AccountCreated(e) => e.occurred_at,
            AccountEvent::MoneyDeposited(e) => e.occurred_at,
            AccountEvent::MoneyWithdrawn(e) => e.occurred_at,
        }
    }

    fn aggregate_id(&self) -> &AggregateId {
        &self.account_id().0
    }
}

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::AccountCreated(e) => {
                // A repeated creation (permissive policy) renames; the balance carries over.
                self.owner = Some(e.owner.clone());
            }
            AccountEvent::MoneyDeposited(_) | AccountEvent::MoneyWithdrawn(_) => {
                let delta = event.balance_delta();
                self.balance = match self.balance.checked_add(delta) {
                    Some(balance) => balance,
                    None => {
                        // Only a stream appended around `handle` can overflow; replay
                        // stays total and clamps at the i64 bound.
                        tracing::error!(
                            account_id = %self.id,
                            balance = self.balance,
                            delta,
                            "balance overflow while applying event; clamping"
                        );
                        self.balance.saturating_add(delta)
                    }
                };
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.ensure_account_id(command.account_id())?;

        let event = match command {
            AccountCommand::CreateAccount(cmd) => self.decide_create(cmd)?,
            AccountCommand::DepositMoney(cmd) => self.decide_deposit(cmd.amount, cmd.occurred_at)?,
            AccountCommand::WithdrawMoney(cmd) => {
                self.decide_withdraw(cmd.amount, cmd.occurred_at)?
            }
        };

        Ok(vec![event])
    }
}

impl Account {
    fn ensure_account_id(&self, account_id: &AccountId) -> DomainResult<()> {
        if &self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> DomainResult<()> {
        if self.policy.require_existing && !self.is_created() {
            return Err(DomainError::unknown_aggregate(&self.id));
        }
        Ok(())
    }

    fn ensure_positive(amount: i64) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::InvalidAmount(amount));
        }
        Ok(())
    }

    fn decide_create(&self, cmd: &CreateAccount) -> DomainResult<AccountEvent> {
        if self.policy.unique_creation && self.is_created() {
            return Err(DomainError::already_exists(&self.id));
        }
        if cmd.owner.trim().is_empty() {
            return Err(DomainError::validation("owner cannot be empty"));
        }
        Ok(AccountEvent::AccountCreated(AccountCreated {
            account_id: self.id.clone(),
            owner: cmd.owner.clone(),
            occurred_at: cmd.occurred_at,
        }))
    }

    fn decide_deposit(&self, amount: i64, occurred_at: DateTime<Utc>) -> DomainResult<AccountEvent> {
        self.ensure_exists()?;
        Self::ensure_positive(amount)?;
        if self.balance.checked_add(amount).is_none() {
            return Err(DomainError::invariant("balance would overflow"));
        }
        Ok(AccountEvent::MoneyDeposited(MoneyDeposited {
            account_id: self.id.clone(),
            amount,
            occurred_at,
        }))
    }

    fn decide_withdraw(&self, amount: i64, occurred_at: DateTime<Utc>) -> DomainResult<AccountEvent> {
        self.ensure_exists()?;
        Self::ensure_positive(amount)?;
        if self.balance < amount {
            return Err(DomainError::InsufficientBalance {
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(AccountEvent::MoneyWithdrawn(MoneyWithdrawn {
            account_id: self.id.clone(),
            amount,
            occurred_at,
        }))
    }
}
