//! Configuration loading and representation.
//!
//! Everything has a default; the environment only overrides.
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `LEDGER_UNIQUE_CREATION` | `true/false/1/0/yes/no` | `true` |
//! | `LEDGER_REQUIRE_EXISTING` | `true/false/1/0/yes/no` | `true` |
//! | `LEDGER_CONCURRENCY` | `serialized` / `optimistic` | `serialized` |

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledger_accounts::AccountPolicy;

pub const ENV_UNIQUE_CREATION: &str = "LEDGER_UNIQUE_CREATION";
pub const ENV_REQUIRE_EXISTING: &str = "LEDGER_REQUIRE_EXISTING";
pub const ENV_CONCURRENCY: &str = "LEDGER_CONCURRENCY";

/// How concurrent commands against one aggregate are kept consistent.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyControl {
    /// Hold a per-aggregate lock for the whole command cycle.
    #[default]
    Serialized,
    /// No lock; a stale expected version is rejected as a concurrent modification.
    Optimistic,
}

impl FromStr for ConcurrencyControl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serialized" => Ok(Self::Serialized),
            "optimistic" => Ok(Self::Optimistic),
            _ => Err(ConfigError::invalid(
                ENV_CONCURRENCY,
                s,
                "expected `serialized` or `optimistic`",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: &'static str) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason,
        }
    }
}

/// Ledger runtime configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub policy: AccountPolicy,
    pub concurrency: ConcurrencyControl,
}

impl LedgerConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (unset keys keep their defaults).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_UNIQUE_CREATION) {
            config.policy.unique_creation = parse_bool(ENV_UNIQUE_CREATION, &value)?;
        }
        if let Some(value) = lookup(ENV_REQUIRE_EXISTING) {
            config.policy.require_existing = parse_bool(ENV_REQUIRE_EXISTING, &value)?;
        }
        if let Some(value) = lookup(ENV_CONCURRENCY) {
            config.concurrency = value.parse()?;
        }

        if config.policy != AccountPolicy::strict() {
            tracing::warn!(policy = ?config.policy, "ledger running with relaxed account policy");
        }
        tracing::debug!(?config, "ledger configuration loaded");

        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected a boolean")),
    }
}
