//! Observability: engine telemetry counters and the sink abstraction.
//!
//! Grid/reconcile/pagination logic MUST NOT touch counter state directly.
//! All instrumentation flows through [`sink::EngineEvent`] and
//! [`sink::EngineSink`]; this module is the only bridge between engine logic
//! and the global telemetry state.

pub(crate) mod metrics;
pub(crate) mod sink;

pub use metrics::EngineCounters;
pub use sink::{EngineEvent, EngineSink, counters_report, counters_reset_all};
