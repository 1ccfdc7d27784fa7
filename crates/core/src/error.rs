//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A monetary amount was zero or negative.
    #[error("invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    /// A withdrawal exceeded the current balance.
    #[error("insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    /// The aggregate was already created.
    #[error("aggregate already exists: {0}")]
    AlreadyExists(String),

    /// The aggregate has no history but the operation requires one.
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn already_exists(id: impl core::fmt::Display) -> Self {
        Self::AlreadyExists(id.to_string())
    }

    pub fn unknown_aggregate(id: impl core::fmt::Display) -> Self {
        Self::UnknownAggregate(id.to_string())
    }
}
