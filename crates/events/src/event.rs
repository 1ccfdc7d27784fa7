use chrono::{DateTime, Utc};

use ledger_core::AggregateId;

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - scoped to exactly one aggregate stream
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "accounts.account.created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time). Provenance only.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// The stream this event belongs to.
    fn aggregate_id(&self) -> &AggregateId;
}
