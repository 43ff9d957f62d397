//! `decisify-kernel` – deterministic guardrails.
//!
//! The kernel does not decide anything; it vetoes.  Every fused
//! [`Decision`][decisify_types::Decision] passes through the gate before it
//! is published.
//!
//! # Modules
//!
//! - [`rules`] – the [`SafetyRule`][rules::SafetyRule] trait and the four
//!   built-in rules: volatility ceilings for `BUY` and `SELL`, a confidence
//!   floor on the dominant weight, and a no-signals check.
//! - [`safety_gate`] – [`SafetyGate`][safety_gate::SafetyGate]: evaluates
//!   the rules in order, replaces a violating decision with a `HOLD`
//!   override, records pass/override metrics and writes the audit log.

pub mod rules;
pub mod safety_gate;

pub use rules::{
    ConfidenceFloor, GateContext, SafetyRule, SignalsPresent, Violation, VolatilityCeiling,
};
pub use safety_gate::{SafetyGate, SafetyThresholds};
