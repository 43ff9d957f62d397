//! [`SafetyGate`] – last check before a decision is published.
//!
//! Rules run in insertion order and the first violation wins: the decision
//! is replaced by a `HOLD` override carrying that rule's message.  When every
//! rule passes the decision is returned unchanged.
//!
//! Both outcomes are counted in the shared
//! [`MetricsCollector`][decisify_metrics::MetricsCollector].

use std::sync::Arc;

use decisify_metrics::MetricsCollector;
use decisify_types::{
    Action, DecisifyError, Decision, SignalMap, VOLATILITY_KEYWORD, source_matches,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::rules::{ConfidenceFloor, GateContext, SafetyRule, SignalsPresent, VolatilityCeiling};

/// Limits used by the built-in rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyThresholds {
    pub max_volatility_for_buy: f64,
    pub max_volatility_for_sell: f64,
    pub min_confidence_threshold: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            max_volatility_for_buy: 0.05,
            max_volatility_for_sell: 0.08,
            min_confidence_threshold: 0.15,
        }
    }
}

impl SafetyThresholds {
    /// Every threshold must lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), DecisifyError> {
        for (name, value) in [
            ("max_volatility_for_buy", self.max_volatility_for_buy),
            ("max_volatility_for_sell", self.max_volatility_for_sell),
            ("min_confidence_threshold", self.min_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DecisifyError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Ordered rule engine over fused decisions.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chrono::Utc;
/// use decisify_kernel::{SafetyGate, SafetyThresholds};
/// use decisify_metrics::MetricsCollector;
/// use decisify_types::{Action, Decision, Signal, SignalMap};
///
/// let gate = SafetyGate::new(SafetyThresholds::default(), Arc::new(MetricsCollector::default()));
///
/// let mut signals = SignalMap::new();
/// signals.insert(
///     "price_volatility".into(),
///     Signal::new("price_volatility", 0.10, Utc::now(), None).unwrap(),
/// );
/// let weights = [("price_volatility".to_string(), 1.0)].into_iter().collect();
/// let proposed = Decision::proposed(Utc::now(), weights, Action::Buy, "fused");
///
/// let checked = gate.validate(&proposed, &signals);
/// assert_eq!(checked.action(), Action::Hold);
/// assert!(!checked.is_safe());
/// ```
pub struct SafetyGate {
    rules: Vec<Box<dyn SafetyRule>>,
    thresholds: SafetyThresholds,
    volatility_keyword: String,
    metrics: Arc<MetricsCollector>,
}

impl SafetyGate {
    /// A gate with the four built-in rules, in priority order.
    pub fn new(thresholds: SafetyThresholds, metrics: Arc<MetricsCollector>) -> Self {
        let mut gate = Self::empty(thresholds, metrics);
        gate.add_rule(Box::new(VolatilityCeiling {
            action: Action::Buy,
            max_volatility: thresholds.max_volatility_for_buy,
        }));
        gate.add_rule(Box::new(VolatilityCeiling {
            action: Action::Sell,
            max_volatility: thresholds.max_volatility_for_sell,
        }));
        gate.add_rule(Box::new(ConfidenceFloor {
            min_weight: thresholds.min_confidence_threshold,
        }));
        gate.add_rule(Box::new(SignalsPresent));
        gate
    }

    /// A gate with no rules; everything passes until rules are added.
    pub fn empty(thresholds: SafetyThresholds, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            rules: Vec::new(),
            thresholds,
            volatility_keyword: VOLATILITY_KEYWORD.to_string(),
            metrics,
        }
    }

    /// Change which sources count as volatility feeds (builder-style).
    pub fn with_volatility_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.volatility_keyword = keyword.into();
        self
    }

    /// Register a rule.  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn SafetyRule>) {
        self.rules.push(rule);
    }

    pub fn thresholds(&self) -> &SafetyThresholds {
        &self.thresholds
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Value of the first volatility source in map order, or `0.0`.
    pub fn volatility(&self, signals: &SignalMap) -> f64 {
        signals
            .iter()
            .find(|(source, _)| source_matches(source, &self.volatility_keyword))
            .map(|(_, s)| s.value())
            .unwrap_or(0.0)
    }

    /// Check `decision` against every rule and return the decision to
    /// publish.  `decision` itself is never modified.
    pub fn validate(&self, decision: &Decision, signals: &SignalMap) -> Decision {
        let ctx = GateContext {
            decision,
            signals,
            volatility: self.volatility(signals),
        };

        for rule in &self.rules {
            if let Err(violation) = rule.check(&ctx) {
                self.metrics.record_safety_override();
                warn!(
                    rule = %violation.rule,
                    from = %decision.action(),
                    to = %Action::Hold,
                    reason = %violation.reason,
                    "safety override"
                );
                return decision.overridden(violation.reason);
            }
        }

        self.metrics.record_safety_pass();
        debug!(action = %decision.action(), "safety check passed");
        decision.clone()
    }

    /// Write the audit trail for a published decision.
    pub fn log_decision(&self, decision: &Decision) {
        let status = if decision.is_safe() { "SAFE" } else { "OVERRIDDEN" };
        info!(status, action = %decision.action(), "decision");
        info!(reasoning = decision.reasoning(), "decision reasoning");
        if let Some(reason) = decision.override_reason() {
            warn!(reason, "decision overridden");
        }
        debug!(weights = %format_weights(decision), "decision weights");
    }
}

/// `"a: 60.0%, b: 40.0%"`, heaviest first, or `"N/A"`.
fn format_weights(decision: &Decision) -> String {
    if decision.weights().is_empty() {
        return "N/A".to_string();
    }
    let mut weights: Vec<(&String, &f64)> = decision.weights().iter().collect();
    weights.sort_by(|a, b| b.1.total_cmp(a.1));
    weights
        .iter()
        .map(|(k, v)| format!("{k}: {:.1}%", *v * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use decisify_types::{Signal, Weights};

    fn gate() -> (SafetyGate, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::default());
        (SafetyGate::new(SafetyThresholds::default(), Arc::clone(&metrics)), metrics)
    }

    fn signals(entries: &[(&str, f64)]) -> SignalMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Signal::new(*k, *v, Utc::now(), None).unwrap()))
            .collect()
    }

    fn decision(action: Action, weights: &[(&str, f64)]) -> Decision {
        let w: Weights = weights.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Decision::proposed(Utc::now(), w, action, "Weighted signal: 0.500")
    }

    #[test]
    fn high_volatility_blocks_buy() {
        let (gate, metrics) = gate();
        let s = signals(&[("price_volatility", 0.10), ("twitter_sentiment", 0.9)]);
        let d = decision(Action::Buy, &[("price_volatility", 0.4), ("twitter_sentiment", 0.6)]);

        let out = gate.validate(&d, &s);

        assert_eq!(out.action(), Action::Hold);
        assert!(!out.is_safe());
        assert!(out.override_reason().unwrap().contains("Volatility"));
        assert_eq!(out.timestamp(), d.timestamp());
        assert_eq!(out.weights(), d.weights());
        assert_eq!(out.reasoning(), d.reasoning());
        // original untouched
        assert_eq!(d.action(), Action::Buy);
        assert!(d.is_safe());
        assert_eq!(metrics.snapshot().safety.overrides, 1);
    }

    #[test]
    fn high_volatility_blocks_sell_with_its_own_threshold() {
        let (gate, _) = gate();
        let d = decision(Action::Sell, &[("a", 1.0)]);

        let ok = gate.validate(&d, &signals(&[("a", -0.9), ("price_volatility", 0.07)]));
        assert!(ok.is_safe());

        let blocked = gate.validate(&d, &signals(&[("a", -0.9), ("price_volatility", 0.12)]));
        assert_eq!(
            blocked.override_reason(),
            Some("Volatility 12.00% exceeds SELL threshold 8.00%")
        );
    }

    #[test]
    fn low_confidence_overrides() {
        let (gate, _) = gate();
        let weights: Vec<(String, f64)> = (0..10).map(|i| (format!("s{i}"), 0.1)).collect();
        let w: Vec<(&str, f64)> = weights.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let d = decision(Action::Buy, &w);

        let out = gate.validate(&d, &signals(&[("s0", 0.5)]));

        assert_eq!(
            out.override_reason(),
            Some("Low confidence: max weight 10.00% below threshold 15.00%")
        );
    }

    #[test]
    fn no_signals_overrides_non_hold() {
        let (gate, _) = gate();
        let out = gate.validate(&decision(Action::Sell, &[]), &SignalMap::new());
        assert_eq!(out.override_reason(), Some("No signals available - safety override to HOLD"));
    }

    #[test]
    fn first_violation_wins() {
        let (gate, _) = gate();
        // Both the BUY ceiling and the confidence floor are violated.
        let d = decision(Action::Buy, &[("a", 0.1), ("price_volatility", 0.1), ("c", 0.1)]);
        let out = gate.validate(&d, &signals(&[("price_volatility", 0.2)]));
        assert!(out.override_reason().unwrap().starts_with("Volatility 20.00% exceeds BUY"));
    }

    #[test]
    fn buy_never_survives_high_volatility() {
        let (gate, _) = gate();
        for vol in [0.051, 0.08, 0.15, 1.0] {
            let spreads = [
                vec![("price_volatility", 1.0)],
                vec![("x", 0.5), ("price_volatility", 0.5)],
            ];
            for weights in spreads {
                let d = decision(Action::Buy, &weights);
                let out = gate.validate(&d, &signals(&[("price_volatility", vol), ("x", 0.9)]));
                assert_ne!(out.action(), Action::Buy);
            }
        }
    }

    #[test]
    fn hold_passes_and_is_idempotent() {
        let (gate, metrics) = gate();
        let s = signals(&[("twitter_sentiment", 0.8), ("price_volatility", 0.01)]);
        let d = decision(Action::Buy, &[("twitter_sentiment", 0.7), ("price_volatility", 0.3)]);

        let once = gate.validate(&d, &s);
        let twice = gate.validate(&once, &s);

        assert_eq!(once, d);
        assert_eq!(twice, once);
        assert_eq!(metrics.snapshot().safety.passes, 2);
    }

    #[test]
    fn volatility_uses_first_matching_source_case_insensitively() {
        let (gate, _) = gate();
        let s = signals(&[("z_volatility", 0.2), ("price_VOLATILITY", 0.01), ("c", 0.5)]);
        assert_eq!(gate.volatility(&s), 0.01);
        assert_eq!(gate.volatility(&signals(&[("c", 0.5)])), 0.0);
    }

    #[test]
    fn custom_keyword_and_rules() {
        let metrics = Arc::new(MetricsCollector::default());
        let mut gate =
            SafetyGate::empty(SafetyThresholds::default(), metrics).with_volatility_keyword("vix");
        gate.add_rule(Box::new(VolatilityCeiling {
            action: Action::Buy,
            max_volatility: 0.3,
        }));
        assert_eq!(gate.rule_names(), vec!["volatility_ceiling_buy"]);

        let out = gate.validate(&decision(Action::Buy, &[("vix", 1.0)]), &signals(&[("vix", 0.5)]));
        assert!(!out.is_safe());
    }

    #[test]
    fn thresholds_must_be_fractions() {
        assert!(SafetyThresholds::default().validate().is_ok());
        let bad = SafetyThresholds {
            max_volatility_for_buy: 1.5,
            ..SafetyThresholds::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn weights_formatted_heaviest_first() {
        let d = decision(Action::Hold, &[("a", 0.25), ("b", 0.75)]);
        assert_eq!(format_weights(&d), "b: 75.0%, a: 25.0%");
        assert_eq!(format_weights(&Decision::neutral(Utc::now())), "N/A");
    }
}
