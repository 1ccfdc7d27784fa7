use ledger_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands represent **intent**: a request to change one aggregate. They are
/// transient (never persisted) and are turned into events once validated
/// against replayed state. An invalid command is rejected and produces nothing.
///
/// Each command operates on one aggregate, which is the consistency boundary;
/// commands for different aggregates can run concurrently.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> &AggregateId;
}
