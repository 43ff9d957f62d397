//! `decisify-runtime` – the decision loop.
//!
//! Wires perception, fusion and the safety kernel into a periodic cycle and
//! publishes each result for concurrent readers.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: owns the
//!   [`PerceptionHub`][decisify_perception::PerceptionHub], the fusion engine
//!   and the [`SafetyGate`][decisify_kernel::SafetyGate], runs one cycle at a
//!   time and manages the `Stopped → Running → Stopping → Stopped` lifecycle.
//!   [`OrchestratorHandle`][orchestrator::OrchestratorHandle] stops it from
//!   another task or a signal handler.
//! - [`state`] – [`StateStore`][state::StateStore]: the latest
//!   [`SystemState`][state::SystemState] behind a single swap, so readers
//!   never observe half of a cycle.
//! - [`query`] – [`ReadApi`][query::ReadApi]: status, decision, signals and
//!   metrics readouts, with a not-ready state before the first cycle.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod orchestrator;
pub mod query;
pub mod state;
pub mod telemetry;

pub use orchestrator::{LifecycleState, Orchestrator, OrchestratorConfig, OrchestratorHandle};
pub use query::{AgentThought, ReadApi, Readout, StatusReport};
pub use state::{StateStore, SystemState};
pub use telemetry::{TracerProviderGuard, init_tracing};
