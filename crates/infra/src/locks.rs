//! Per-aggregate serialisation of command cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ledger_core::AggregateId;

/// One mutex per aggregate stream.
///
/// Holding a stream's lock across read → replay → decide → append makes the
/// cycle atomic for that id. Different ids get different mutexes and never
/// contend beyond the brief map lookup.
#[derive(Debug, Default)]
pub struct StreamLocks {
    locks: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
}

impl StreamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `aggregate_id`.
    pub fn with_lock<T>(&self, aggregate_id: &AggregateId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(aggregate_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of streams that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, aggregate_id: &AggregateId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(aggregate_id.clone()).or_default().clone()
    }
}
