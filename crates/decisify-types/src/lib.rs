//! `decisify-types` – shared value objects for the decision pipeline.
//!
//! - [`Signal`] – one sourced, timestamped scalar observation.
//! - [`Decision`] – the fused, safety-checked verdict with its attention
//!   weights and a human-readable audit trail.
//! - [`Action`] – the discrete outcome (`BUY` / `SELL` / `HOLD`).
//! - [`DecisifyError`] – construction and validation failures.
//!
//! Both [`Signal`] and [`Decision`] validate their invariants at the
//! construction boundary (including deserialization), so every value that
//! reaches the pipeline is well formed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signals keyed by source name.  Ordered so that iteration, tie-breaking and
/// serialized output are deterministic.
pub type SignalMap = BTreeMap<String, Signal>;

/// Attention weights keyed by source name.
pub type Weights = BTreeMap<String, f64>;

/// Maximum allowed deviation of a non-empty weight map from a unit sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Reasoning attached to the neutral fallback decision.
pub const NEUTRAL_REASONING: &str = "All signals null or unavailable - defaulting to neutral state";

/// Source-name keyword that marks a volatility-style signal.
pub const VOLATILITY_KEYWORD: &str = "volatility";

/// Case-insensitive substring match of `source` against a category keyword.
pub fn source_matches(source: &str, keyword: &str) -> bool {
    source.to_lowercase().contains(&keyword.to_lowercase())
}

/// The entry with the largest weight.  Ties go to the key that sorts first.
pub fn dominant_weight(weights: &Weights) -> Option<(&str, f64)> {
    weights
        .iter()
        .fold(None, |best: Option<(&str, f64)>, (src, &w)| match best {
            Some((_, bw)) if bw >= w => best,
            _ => Some((src.as_str(), w)),
        })
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type for malformed inputs and fatal cycle failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecisifyError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate signal source: {0}")]
    DuplicateSource(String),

    #[error("Decision cycle failed: {0}")]
    CycleFailed(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Signal
// ────────────────────────────────────────────────────────────────────────────

/// A single observation produced by a signal source.
///
/// `value` is conventionally in `[-1.0, 1.0]` for sentiment-style sources and
/// a raw non-negative metric (e.g. volatility) otherwise.
///
/// ```
/// use chrono::Utc;
/// use decisify_types::Signal;
///
/// let s = Signal::new("twitter_sentiment", 0.75, Utc::now(), Some("bullish".into())).unwrap();
/// assert_eq!(s.source(), "twitter_sentiment");
///
/// assert!(Signal::new("", 0.1, Utc::now(), None).is_err());
/// assert!(Signal::new("news", f64::NAN, Utc::now(), None).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "SignalRecord")]
pub struct Signal {
    source: String,
    value: f64,
    timestamp: DateTime<Utc>,
    raw_content: Option<String>,
}

#[derive(Deserialize)]
struct SignalRecord {
    source: String,
    value: f64,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    raw_content: Option<String>,
}

impl TryFrom<SignalRecord> for Signal {
    type Error = DecisifyError;

    fn try_from(r: SignalRecord) -> Result<Self, Self::Error> {
        Signal::new(r.source, r.value, r.timestamp, r.raw_content)
    }
}

impl Signal {
    /// Construct a signal, rejecting a blank `source` or a non-finite `value`.
    pub fn new(
        source: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
        raw_content: Option<String>,
    ) -> Result<Self, DecisifyError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(DecisifyError::InvalidSignal("source must not be empty".into()));
        }
        if !value.is_finite() {
            return Err(DecisifyError::InvalidSignal(format!(
                "value for '{source}' must be finite, got {value}"
            )));
        }
        Ok(Self {
            source,
            value,
            timestamp,
            raw_content,
        })
    }

    /// The zero-valued stand-in for a source that failed after all retries.
    pub fn null(source: impl Into<String>, cause: impl fmt::Display, at: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            value: 0.0,
            timestamp: at,
            raw_content: Some(format!("ERROR: {cause}")),
        }
    }

    /// Return a copy of this signal attributed to `source`.
    pub fn with_source(self, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..self
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn raw_content(&self) -> Option<&str> {
        self.raw_content.as_deref()
    }

    /// `true` for synthesized null signals and sources that reported zero.
    pub fn is_null(&self) -> bool {
        self.value == 0.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Action
// ────────────────────────────────────────────────────────────────────────────

/// The discrete recommendation carried by a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Map a fused signal value to an action.
    ///
    /// Strictly above `threshold` is `Buy`, strictly below `-threshold` is
    /// `Sell`; the boundaries themselves map to `Hold`.
    pub fn from_weighted_value(weighted_value: f64, threshold: f64) -> Self {
        if weighted_value > threshold {
            Action::Buy
        } else if weighted_value < -threshold {
            Action::Sell
        } else {
            Action::Hold
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Decision
// ────────────────────────────────────────────────────────────────────────────

/// The complete decision artifact: what was decided, how each source was
/// weighted, why, and whether it survived the safety gate.
///
/// `is_safe` is `false` exactly when `override_reason` is set.  The only way
/// to produce an unsafe decision is [`Decision::overridden`], which sets
/// both together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "DecisionRecord")]
pub struct Decision {
    timestamp: DateTime<Utc>,
    weights: Weights,
    action: Action,
    reasoning: String,
    is_safe: bool,
    override_reason: Option<String>,
    explanation: Option<String>,
}

#[derive(Deserialize)]
struct DecisionRecord {
    timestamp: DateTime<Utc>,
    weights: Weights,
    action: Action,
    reasoning: String,
    is_safe: bool,
    #[serde(default)]
    override_reason: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

impl TryFrom<DecisionRecord> for Decision {
    type Error = DecisifyError;

    fn try_from(r: DecisionRecord) -> Result<Self, Self::Error> {
        if r.is_safe == r.override_reason.is_some() {
            return Err(DecisifyError::InvalidDecision(
                "is_safe must be false exactly when override_reason is set".into(),
            ));
        }
        let decision = Decision {
            timestamp: r.timestamp,
            weights: r.weights,
            action: r.action,
            reasoning: r.reasoning,
            is_safe: r.is_safe,
            override_reason: r.override_reason,
            explanation: r.explanation,
        };
        decision.validate()?;
        Ok(decision)
    }
}

impl Decision {
    /// A freshly fused decision, not yet checked by the safety gate.
    pub fn proposed(
        timestamp: DateTime<Utc>,
        weights: Weights,
        action: Action,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            weights,
            action,
            reasoning: reasoning.into(),
            is_safe: true,
            override_reason: None,
            explanation: None,
        }
    }

    /// The fixed fallback when no usable signal is available.
    pub fn neutral(timestamp: DateTime<Utc>) -> Self {
        Self::proposed(timestamp, Weights::new(), Action::Hold, NEUTRAL_REASONING)
    }

    /// A new decision forced to `HOLD` by a safety rule.
    ///
    /// Timestamp, weights and reasoning are carried over from `self`.
    pub fn overridden(&self, reason: impl Into<String>) -> Self {
        Self {
            timestamp: self.timestamp,
            weights: self.weights.clone(),
            action: Action::Hold,
            reasoning: self.reasoning.clone(),
            is_safe: false,
            override_reason: Some(reason.into()),
            explanation: None,
        }
    }

    /// Attach a natural-language explanation.
    pub fn with_explanation(self, explanation: impl Into<String>) -> Self {
        Self {
            explanation: Some(explanation.into()),
            ..self
        }
    }

    /// Check the weight invariants: finite, non-negative, and summing to
    /// `1.0 ± WEIGHT_SUM_TOLERANCE` when non-empty.
    pub fn validate(&self) -> Result<(), DecisifyError> {
        if let Some((src, w)) = self
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(DecisifyError::InvalidDecision(format!(
                "weight for '{src}' must be finite and non-negative, got {w}"
            )));
        }
        if !self.weights.is_empty() {
            let total: f64 = self.weights.values().sum();
            if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(DecisifyError::InvalidDecision(format!(
                    "weights sum to {total}, expected 1.0"
                )));
            }
        }
        Ok(())
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn is_safe(&self) -> bool {
        self.is_safe
    }

    pub fn override_reason(&self) -> Option<&str> {
        self.override_reason.as_deref()
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// The source with the largest weight.  Ties go to the source that sorts
    /// first.
    pub fn dominant_source(&self) -> Option<(&str, f64)> {
        dominant_weight(&self.weights)
    }

    /// The largest weight, if any.
    pub fn max_weight(&self) -> Option<f64> {
        self.dominant_source().map(|(_, w)| w)
    }
}

/// JSON Schema of [`Decision`] for external consumers.
pub fn decision_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Decision)
}
