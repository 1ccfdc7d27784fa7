//! Projection implementations (read model builders).
//!
//! Projections consume committed events and build query-friendly views.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event store at any time
//! - **Idempotent**: safe for at-least-once delivery

pub mod account_summary;

pub use account_summary::AccountSummaryProjection;
