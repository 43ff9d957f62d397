//! `decisify-perception` – signal acquisition and attention fusion.
//!
//! Turns a handful of independent, unreliable signal feeds into one weighted
//! score and a discrete [`Action`][decisify_types::Action].
//!
//! # Modules
//!
//! - [`source`] – the [`SignalSource`][source::SignalSource] contract, the
//!   [`SourceError`][source::SourceError] taxonomy (retryable vs. permanent)
//!   and the built-in simulated / HTTP sources.
//! - [`retry`] – [`RetryPolicy`][retry::RetryPolicy]: pure exponential
//!   backoff and the `Attempting → Succeeded | Exhausted` transition used per
//!   fetch.
//! - [`hub`] – [`PerceptionHub`][hub::PerceptionHub]: fans out to every
//!   source concurrently, retries transient failures, and degrades exhausted
//!   sources to null signals.  Never fails.
//! - [`fusion`] – the [`FusionEngine`][fusion::FusionEngine] trait with a
//!   reference and an optimized temperature-scaled softmax implementation.
//! - [`explain`] – [`explain_decision`][explain::explain_decision]: the
//!   operator-facing narrative for a finished decision.

pub mod explain;
pub mod fusion;
pub mod hub;
pub mod retry;
pub mod source;

pub use explain::explain_decision;
pub use fusion::{
    FusionEngine, FusionPolicy, FusionVariant, OptimizedFusion, ReferenceFusion,
    build_fusion_engine,
};
pub use hub::{HubConfig, PerceptionHub};
pub use retry::{FetchState, RetryPolicy};
pub use source::{
    FlakySource, FnSource, HttpSource, SignalSource, SimulatedSource, SourceError,
    default_sources,
};
