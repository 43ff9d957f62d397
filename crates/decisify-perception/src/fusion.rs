//! Attention fusion: signal map → weighted score → [`Decision`].
//!
//! # Scoring
//!
//! ```text
//! base    = |value|                      (× volatility_boost for volatility sources)
//! recency = exp(-max(age, 0) / recency_scale_secs)
//! score   = base × recency
//! weight  = softmax(score / temperature)
//! ```
//!
//! The weighted value `Σ weightᵢ × valueᵢ` is mapped to an [`Action`] with
//! a symmetric dead band of `action_threshold`.
//!
//! Two engines implement [`FusionEngine`]; both shift scores by their maximum
//! before exponentiating, so they agree on every input:
//!
//! - [`ReferenceFusion`] – one map per step, easy to audit.
//! - [`OptimizedFusion`] – a single buffer, weights and weighted value
//!   computed in one sweep.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use decisify_types::{
    Action, DecisifyError, Decision, Signal, SignalMap, VOLATILITY_KEYWORD, Weights,
    dominant_weight, source_matches,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::explain::explain_decision;

/// Characters of the dominant source's content quoted in the reasoning.
const REASONING_CONTEXT_CHARS: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Tunable scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionPolicy {
    /// Signals lose `1/e` of their influence every this many seconds.
    pub recency_scale_secs: f64,
    /// Multiplier applied to the base score of volatility sources.
    pub volatility_boost: f64,
    /// Weighted value must exceed `±action_threshold` to leave `HOLD`.
    pub action_threshold: f64,
    /// Case-insensitive substring identifying volatility sources.
    pub volatility_keyword: String,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            recency_scale_secs: 60.0,
            volatility_boost: 1.5,
            action_threshold: 0.3,
            volatility_keyword: VOLATILITY_KEYWORD.to_string(),
        }
    }
}

impl FusionPolicy {
    pub fn validate(&self) -> Result<(), DecisifyError> {
        if !(self.recency_scale_secs.is_finite() && self.recency_scale_secs > 0.0) {
            return Err(DecisifyError::InvalidConfig(format!(
                "recency_scale_secs must be positive, got {}",
                self.recency_scale_secs
            )));
        }
        if !(self.volatility_boost.is_finite() && self.volatility_boost >= 0.0) {
            return Err(DecisifyError::InvalidConfig(format!(
                "volatility_boost must be non-negative, got {}",
                self.volatility_boost
            )));
        }
        if !(self.action_threshold.is_finite() && self.action_threshold >= 0.0) {
            return Err(DecisifyError::InvalidConfig(format!(
                "action_threshold must be non-negative, got {}",
                self.action_threshold
            )));
        }
        if self.volatility_keyword.trim().is_empty() {
            return Err(DecisifyError::InvalidConfig(
                "volatility_keyword must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Raw attention score of `signal` as seen at `now`.
    pub fn score(&self, signal: &Signal, now: DateTime<Utc>) -> f64 {
        let mut base = signal.value().abs();
        if source_matches(signal.source(), &self.volatility_keyword) {
            base *= self.volatility_boost;
        }
        // Future timestamps count as fresh.
        let age_secs = (now - signal.timestamp())
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        base * (-age_secs / self.recency_scale_secs).exp()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine trait
// ─────────────────────────────────────────────────────────────────────────────

/// Selects a [`FusionEngine`] implementation at construction time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionVariant {
    Reference,
    #[default]
    Optimized,
}

/// Pure, synchronous signal-to-decision fusion.
pub trait FusionEngine: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    fn temperature(&self) -> f64;

    fn policy(&self) -> &FusionPolicy;

    /// Fuse `signals` as observed at `now`.
    fn decide_at(&self, signals: &SignalMap, now: DateTime<Utc>) -> Decision;

    /// Fuse `signals` as observed right now.
    fn decide(&self, signals: &SignalMap) -> Decision {
        self.decide_at(signals, Utc::now())
    }

    /// Operator-facing narrative for a finished decision.
    fn explain(&self, decision: &Decision, signals: &SignalMap) -> String {
        explain_decision(decision, signals)
    }
}

/// Construct the engine named by `variant`.
///
/// ```
/// use decisify_perception::{FusionPolicy, FusionVariant, build_fusion_engine};
///
/// let engine =
///     build_fusion_engine(FusionVariant::Reference, 1.0, FusionPolicy::default()).unwrap();
/// assert_eq!(engine.name(), "reference");
/// assert!(build_fusion_engine(FusionVariant::Optimized, 0.0, FusionPolicy::default()).is_err());
/// ```
pub fn build_fusion_engine(
    variant: FusionVariant,
    temperature: f64,
    policy: FusionPolicy,
) -> Result<Box<dyn FusionEngine>, DecisifyError> {
    Ok(match variant {
        FusionVariant::Reference => Box::new(ReferenceFusion::new(temperature, policy)?),
        FusionVariant::Optimized => Box::new(OptimizedFusion::new(temperature, policy)?),
    })
}

fn check_params(temperature: f64, policy: &FusionPolicy) -> Result<(), DecisifyError> {
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(DecisifyError::InvalidConfig(format!(
            "temperature must be positive and finite, got {temperature}"
        )));
    }
    policy.validate()
}

/// `true` when there is nothing to fuse.
fn is_degenerate(signals: &SignalMap) -> bool {
    signals.values().all(|s| s.value() == 0.0)
}

fn neutral(now: DateTime<Utc>) -> Decision {
    warn!("all signals null or unavailable, returning neutral decision");
    Decision::neutral(now)
}

fn uniform(signals: &SignalMap) -> Weights {
    let w = 1.0 / signals.len() as f64;
    signals.keys().map(|k| (k.clone(), w)).collect()
}

fn reasoning(signals: &SignalMap, weights: &Weights, weighted_value: f64) -> String {
    let mut parts = vec![format!("Weighted signal: {weighted_value:.3}")];
    if let Some((source, weight)) = dominant_weight(weights) {
        parts.push(format!("Dominant source: {source} ({:.1}% weight)", weight * 100.0));
        if let Some(signal) = signals.get(source) {
            parts.push(format!("Signal value: {:.3}", signal.value()));
            if let Some(content) = signal.raw_content().filter(|c| !c.is_empty()) {
                let context: String = content.chars().take(REASONING_CONTEXT_CHARS).collect();
                parts.push(format!("Context: {context}"));
            }
        }
    }
    parts.join(" | ")
}

fn conclude(
    engine: &str,
    policy: &FusionPolicy,
    signals: &SignalMap,
    weights: Weights,
    weighted_value: f64,
    now: DateTime<Utc>,
) -> Decision {
    let action = Action::from_weighted_value(weighted_value, policy.action_threshold);
    let reasoning = reasoning(signals, &weights, weighted_value);
    debug!(engine, %action, weighted_value, "fused decision");
    Decision::proposed(now, weights, action, reasoning)
}

// ─────────────────────────────────────────────────────────────────────────────
// ReferenceFusion
// ─────────────────────────────────────────────────────────────────────────────

/// Step-by-step engine: scores, scaled scores, exponentials and weights each
/// live in their own map.
#[derive(Debug, Clone)]
pub struct ReferenceFusion {
    temperature: f64,
    policy: FusionPolicy,
}

impl ReferenceFusion {
    pub fn new(temperature: f64, policy: FusionPolicy) -> Result<Self, DecisifyError> {
        check_params(temperature, &policy)?;
        Ok(Self { temperature, policy })
    }

    fn scores(&self, signals: &SignalMap, now: DateTime<Utc>) -> BTreeMap<String, f64> {
        signals
            .iter()
            .map(|(k, s)| (k.clone(), self.policy.score(s, now)))
            .collect()
    }

    fn softmax(&self, scores: &BTreeMap<String, f64>) -> Option<Weights> {
        let scaled: BTreeMap<&str, f64> = scores
            .iter()
            .map(|(k, v)| (k.as_str(), v / self.temperature))
            .collect();
        let max = scaled.values().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: BTreeMap<&str, f64> = scaled.iter().map(|(k, v)| (*k, (v - max).exp())).collect();
        let total: f64 = exps.values().sum();
        if !(total.is_finite() && total > 0.0) {
            return None;
        }
        Some(exps.into_iter().map(|(k, e)| (k.to_string(), e / total)).collect())
    }
}

impl FusionEngine for ReferenceFusion {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    fn decide_at(&self, signals: &SignalMap, now: DateTime<Utc>) -> Decision {
        if is_degenerate(signals) {
            return neutral(now);
        }
        let scores = self.scores(signals, now);
        let weights = self.softmax(&scores).unwrap_or_else(|| uniform(signals));
        let weighted_value = signals
            .iter()
            .map(|(k, s)| weights.get(k).copied().unwrap_or(0.0) * s.value())
            .sum();
        conclude(self.name(), &self.policy, signals, weights, weighted_value, now)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OptimizedFusion
// ─────────────────────────────────────────────────────────────────────────────

/// Single-buffer engine.
///
/// Scaled scores are written into one `Vec`, exponentiated in place, and the
/// weighted value is accumulated alongside the normalising total.
#[derive(Debug, Clone)]
pub struct OptimizedFusion {
    temperature: f64,
    policy: FusionPolicy,
}

impl OptimizedFusion {
    pub fn new(temperature: f64, policy: FusionPolicy) -> Result<Self, DecisifyError> {
        check_params(temperature, &policy)?;
        Ok(Self { temperature, policy })
    }
}

impl FusionEngine for OptimizedFusion {
    fn name(&self) -> &'static str {
        "optimized"
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    fn decide_at(&self, signals: &SignalMap, now: DateTime<Utc>) -> Decision {
        if is_degenerate(signals) {
            return neutral(now);
        }

        let inv_t = self.temperature.recip();
        let mut buf: Vec<f64> = Vec::with_capacity(signals.len());
        let mut max = f64::NEG_INFINITY;
        for signal in signals.values() {
            let scaled = self.policy.score(signal, now) * inv_t;
            max = max.max(scaled);
            buf.push(scaled);
        }

        let mut total = 0.0;
        let mut weighted_sum = 0.0;
        for (slot, signal) in buf.iter_mut().zip(signals.values()) {
            *slot = (*slot - max).exp();
            total += *slot;
            weighted_sum += *slot * signal.value();
        }

        let (weights, weighted_value) = if total.is_finite() && total > 0.0 {
            let weights = signals
                .keys()
                .zip(&buf)
                .map(|(k, e)| (k.clone(), e / total))
                .collect();
            (weights, weighted_sum / total)
        } else {
            let weights = uniform(signals);
            let mean = signals.values().map(Signal::value).sum::<f64>() / signals.len() as f64;
            (weights, mean)
        };
        conclude(self.name(), &self.policy, signals, weights, weighted_value, now)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
