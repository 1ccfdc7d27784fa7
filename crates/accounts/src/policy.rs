use serde::{Deserialize, Serialize};

/// Business-rule switches for the account aggregate.
///
/// The strict policy is the default. The permissive policy accepts repeated
/// `AccountCreated` events and commands against accounts that were never
/// created, which is how unguarded ledgers historically behaved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountPolicy {
    /// Reject `CreateAccount` when the stream already holds a creation event.
    pub unique_creation: bool,
    /// Reject deposits, withdrawals and projections for streams with no creation event.
    pub require_existing: bool,
}

impl AccountPolicy {
    pub const fn strict() -> Self {
        Self {
            unique_creation: true,
            require_existing: true,
        }
    }

    pub const fn permissive() -> Self {
        Self {
            unique_creation: false,
            require_existing: false,
        }
    }
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self::strict()
    }
}
