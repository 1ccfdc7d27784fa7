//! Accounts module (event-sourced balance ledger).
//!
//! Pure domain logic only: no IO, no locking, no persistence concerns.

pub mod account;
pub mod policy;

pub use account::{
    Account, AccountCommand, AccountCreated, AccountEvent, AccountId, AccountProjection,
    CreateAccount, DepositMoney, MoneyDeposited, MoneyWithdrawn, WithdrawMoney,
};
pub use policy::AccountPolicy;
