use serde::{Deserialize, Serialize};
use std::cell::RefCell;

///
/// EngineCounters
/// Ephemeral, in-memory counters for engine activity.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EngineCounters {
    // Reconciliation
    pub reconcile_runs: u64,
    pub cards_replaced: u64,
    pub cards_appended: u64,
    pub cards_removed: u64,
    pub identity_collisions: u64,

    // Pagination
    pub fetches_dispatched: u64,
    pub stale_batches_dropped: u64,
    pub exhaustions: u64,

    // Persistence
    pub config_writes: u64,
    pub commit_failures: u64,
}

thread_local! {
    static COUNTER_STATE: RefCell<EngineCounters> = RefCell::new(EngineCounters::default());
}

/// Borrow counters immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EngineCounters) -> R) -> R {
    COUNTER_STATE.with(|m| f(&m.borrow()))
}

/// Borrow counters mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EngineCounters) -> R) -> R {
    COUNTER_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EngineCounters::default());
}
