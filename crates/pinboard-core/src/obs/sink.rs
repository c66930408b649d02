//! Telemetry sink boundary.
//!
//! Engine logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through EngineEvent and EngineSink.
//!
//! This module is the only allowed bridge between engine logic
//! and the global counter state.
use crate::{
    model::CardIdentity,
    obs::metrics::{self, EngineCounters},
};
use std::cell::RefCell;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn EngineSink>> = const { RefCell::new(None) };
}

///
/// EngineEvent
///

#[derive(Clone, Copy, Debug)]
pub enum EngineEvent {
    ReconcileApplied {
        replaced: u64,
        appended: u64,
        removed: u64,
    },
    RemoteRemoval {
        identity: CardIdentity,
    },
    IdentityCollision {
        identity: CardIdentity,
    },
    FetchDispatched {
        page: u32,
    },
    StaleBatchDropped {
        generation: u64,
    },
    ExhaustionReached {
        batch_len: u32,
        expected: u32,
    },
    ConfigPersisted {
        loaded_count: u32,
    },
    CommitFailed {
        identity: CardIdentity,
    },
}

///
/// EngineSink
///

pub trait EngineSink {
    fn record(&self, event: EngineEvent);
}

/// GlobalEngineSink
/// Default process-local sink that writes into global counter state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalEngineSink;

impl EngineSink for GlobalEngineSink {
    fn record(&self, event: EngineEvent) {
        match event {
            EngineEvent::ReconcileApplied {
                replaced,
                appended,
                removed,
            } => {
                metrics::with_state_mut(|m| {
                    m.reconcile_runs = m.reconcile_runs.saturating_add(1);
                    m.cards_replaced = m.cards_replaced.saturating_add(replaced);
                    m.cards_appended = m.cards_appended.saturating_add(appended);
                    m.cards_removed = m.cards_removed.saturating_add(removed);
                });
            }

            EngineEvent::RemoteRemoval { .. } => {
                // Per-card removals are already aggregated by ReconcileApplied;
                // the discrete event exists for scoped sinks.
            }

            EngineEvent::IdentityCollision { .. } => {
                metrics::with_state_mut(|m| {
                    m.identity_collisions = m.identity_collisions.saturating_add(1);
                });
            }

            EngineEvent::FetchDispatched { .. } => {
                metrics::with_state_mut(|m| {
                    m.fetches_dispatched = m.fetches_dispatched.saturating_add(1);
                });
            }

            EngineEvent::StaleBatchDropped { .. } => {
                metrics::with_state_mut(|m| {
                    m.stale_batches_dropped = m.stale_batches_dropped.saturating_add(1);
                });
            }

            EngineEvent::ExhaustionReached { .. } => {
                metrics::with_state_mut(|m| {
                    m.exhaustions = m.exhaustions.saturating_add(1);
                });
            }

            EngineEvent::ConfigPersisted { .. } => {
                metrics::with_state_mut(|m| {
                    m.config_writes = m.config_writes.saturating_add(1);
                });
            }

            EngineEvent::CommitFailed { .. } => {
                metrics::with_state_mut(|m| {
                    m.commit_failures = m.commit_failures.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_ENGINE_SINK: GlobalEngineSink = GlobalEngineSink;

pub(crate) fn record(event: EngineEvent) {
    let override_ptr = SINK_OVERRIDE.with(|cell| *cell.borrow());
    if let Some(ptr) = override_ptr {
        // SAFETY:
        // Preconditions:
        // - `ptr` was produced from a valid `&dyn EngineSink` in `with_engine_sink`.
        // - `with_engine_sink` always restores the previous pointer before returning,
        //   including unwind paths via `Guard::drop`.
        // - `record` is synchronous and never stores `ptr` beyond this call.
        //
        // Aliasing:
        // - We materialize only a shared reference (`&dyn EngineSink`), matching the
        //   original shared borrow used to install the override.
        // - No mutable alias to the same sink is created here.
        //
        // What would break this:
        // - If `with_engine_sink` failed to restore on all exits (normal + panic),
        //   `ptr` could outlive the borrowed sink and become dangling.
        // - If `record` were changed to store or dispatch asynchronously using `ptr`,
        //   lifetime assumptions would no longer hold.
        unsafe { (&*ptr).record(event) };
    } else {
        GLOBAL_ENGINE_SINK.record(event);
    }
}

/// Snapshot the current counter state for endpoint/test plumbing.
#[must_use]
pub fn counters_report() -> EngineCounters {
    metrics::with_state(Clone::clone)
}

/// Reset all counter state.
pub fn counters_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary engine sink override.
pub(crate) fn with_engine_sink<T>(sink: &dyn EngineSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<*const dyn EngineSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0;
            });
        }
    }

    // SAFETY:
    // Preconditions:
    // - `sink_ptr` is installed only for this dynamic scope.
    // - `Guard` always restores the previous slot on all exits, including panic.
    // - `record` only dereferences synchronously and never persists `sink_ptr`.
    //
    // Aliasing:
    // - We erase lifetime to a raw pointer, but still only expose shared access.
    // - No mutable alias to the same sink is introduced by this conversion.
    //
    // What would break this:
    // - Any async/deferred use of `sink_ptr` beyond this scope.
    // - Any path that bypasses Guard restoration.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn EngineSink, *const dyn EngineSink>(sink) };
    let prev = SINK_OVERRIDE.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.replace(sink_ptr)
    });
    let _guard = Guard(prev);

    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink<'a> {
        calls: &'a AtomicUsize,
    }

    impl EngineSink for CountingSink<'_> {
        fn record(&self, _: EngineEvent) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn with_engine_sink_routes_and_restores_nested_overrides() {
        SINK_OVERRIDE.with(|cell| {
            *cell.borrow_mut() = None;
        });

        let outer_calls = AtomicUsize::new(0);
        let inner_calls = AtomicUsize::new(0);
        let outer = CountingSink {
            calls: &outer_calls,
        };
        let inner = CountingSink {
            calls: &inner_calls,
        };

        with_engine_sink(&outer, || {
            record(EngineEvent::FetchDispatched { page: 0 });
            assert_eq!(outer_calls.load(Ordering::SeqCst), 1);
            assert_eq!(inner_calls.load(Ordering::SeqCst), 0);

            with_engine_sink(&inner, || {
                record(EngineEvent::FetchDispatched { page: 1 });
            });

            // Inner override was restored to outer override.
            record(EngineEvent::FetchDispatched { page: 2 });
        });

        assert_eq!(outer_calls.load(Ordering::SeqCst), 2);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 1);

        // Outer override was restored to previous (none).
        SINK_OVERRIDE.with(|cell| {
            assert!(cell.borrow().is_none());
        });
    }

    #[test]
    fn with_engine_sink_restores_override_on_panic() {
        SINK_OVERRIDE.with(|cell| {
            *cell.borrow_mut() = None;
        });

        let calls = AtomicUsize::new(0);
        let sink = CountingSink { calls: &calls };

        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_engine_sink(&sink, || {
                record(EngineEvent::StaleBatchDropped { generation: 1 });
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();
        assert!(panicked);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Guard restored TLS slot after unwind.
        SINK_OVERRIDE.with(|cell| {
            assert!(cell.borrow().is_none());
        });
    }

    #[test]
    fn global_sink_accumulates_counters() {
        counters_reset_all();

        record(EngineEvent::ReconcileApplied {
            replaced: 2,
            appended: 3,
            removed: 1,
        });
        record(EngineEvent::ExhaustionReached {
            batch_len: 15,
            expected: 40,
        });

        let counters = counters_report();
        assert_eq!(counters.reconcile_runs, 1);
        assert_eq!(counters.cards_replaced, 2);
        assert_eq!(counters.cards_appended, 3);
        assert_eq!(counters.cards_removed, 1);
        assert_eq!(counters.exhaustions, 1);
    }
}
