use crate::{Event, EventEnvelope};

/// A projection builds a read model from committed events.
///
/// Read models are **disposable**: events are the source of truth, and any
/// projection can be cleared and rebuilt by replaying the store.
///
/// `apply` must be idempotent. The same envelope may arrive more than once
/// (bus redelivery, or a rebuild racing live traffic); implementations
/// usually skip envelopes whose `sequence_number` they already applied for
/// that stream.
pub trait Projection {
    type Ev: Event;

    /// Apply a single committed event to the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);

    /// Drop all read-model state ahead of a rebuild.
    fn reset(&mut self);
}
