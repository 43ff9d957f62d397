//! `decisify-metrics` – performance counters for the decision pipeline.
//!
//! # Modules
//!
//! - [`collector`] – [`MetricsCollector`][collector::MetricsCollector]:
//!   sliding-window latency samples plus cumulative counters, shared by every
//!   pipeline stage behind a single mutex.  [`snapshot`][collector::MetricsCollector::snapshot]
//!   aggregates them on demand.
//! - [`timer`] – [`ScopedTimer`][timer::ScopedTimer]: measures a scope and
//!   reports the elapsed milliseconds when it is dropped, on every exit path.

pub mod collector;
pub mod timer;

pub use collector::{
    ApiStats, DEFAULT_WINDOW_SIZE, DecisionStats, MetricsCollector, MetricsSnapshot, SafetyStats,
    SensorStats,
};
pub use timer::ScopedTimer;
