//! Safety rules evaluated by the [`SafetyGate`][crate::safety_gate::SafetyGate].
//!
//! A rule inspects a [`GateContext`] and either lets it through or returns a
//! [`Violation`] whose message becomes the decision's `override_reason`.

use decisify_types::{Action, Decision, SignalMap};
use thiserror::Error;

/// What a rule gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub decision: &'a Decision,
    pub signals: &'a SignalMap,
    /// Value of the first volatility source, or `0.0` when there is none.
    pub volatility: f64,
}

/// A rule that fired.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct Violation {
    pub rule: String,
    pub reason: String,
}

impl Violation {
    pub fn new(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single deterministic guardrail.
///
/// Implement this trait for custom rules and register them with
/// [`SafetyGate::add_rule`][crate::safety_gate::SafetyGate::add_rule].
pub trait SafetyRule: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// `Ok(())` when the decision may stand, otherwise the reason to force
    /// `HOLD`.
    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Violation>;
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Blocks `action` while volatility is above `max_volatility`.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityCeiling {
    pub action: Action,
    pub max_volatility: f64,
}

impl SafetyRule for VolatilityCeiling {
    fn name(&self) -> &str {
        match self.action {
            Action::Buy => "volatility_ceiling_buy",
            Action::Sell => "volatility_ceiling_sell",
            Action::Hold => "volatility_ceiling_hold",
        }
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Violation> {
        if ctx.decision.action() == self.action && ctx.volatility > self.max_volatility {
            return Err(Violation::new(
                self.name(),
                format!(
                    "Volatility {:.2}% exceeds {} threshold {:.2}%",
                    ctx.volatility * 100.0,
                    self.action,
                    self.max_volatility * 100.0
                ),
            ));
        }
        Ok(())
    }
}

/// Blocks a non-`HOLD` action when even the dominant source carries less
/// than `min_weight`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceFloor {
    pub min_weight: f64,
}

impl SafetyRule for ConfidenceFloor {
    fn name(&self) -> &str {
        "confidence_floor"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Violation> {
        if ctx.decision.action() == Action::Hold {
            return Ok(());
        }
        match ctx.decision.max_weight() {
            Some(max) if max < self.min_weight => Err(Violation::new(
                self.name(),
                format!(
                    "Low confidence: max weight {:.2}% below threshold {:.2}%",
                    max * 100.0,
                    self.min_weight * 100.0
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// Blocks a non-`HOLD` action when no signals were observed at all.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalsPresent;

impl SafetyRule for SignalsPresent {
    fn name(&self) -> &str {
        "signals_present"
    }

    fn check(&self, ctx: &GateContext<'_>) -> Result<(), Violation> {
        if ctx.signals.is_empty() && ctx.decision.action() != Action::Hold {
            return Err(Violation::new(
                self.name(),
                "No signals available - safety override to HOLD",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use decisify_types::{Signal, Weights};

    fn decision(action: Action, weights: &[(&str, f64)]) -> Decision {
        let w: Weights = weights.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Decision::proposed(Utc::now(), w, action, "test")
    }

    fn one_signal() -> SignalMap {
        let mut m = SignalMap::new();
        m.insert("a".into(), Signal::new("a", 0.5, Utc::now(), None).unwrap());
        m
    }

    #[test]
    fn volatility_ceiling_only_applies_to_its_action() {
        let rule = VolatilityCeiling {
            action: Action::Buy,
            max_volatility: 0.05,
        };
        let signals = one_signal();
        let sell = decision(Action::Sell, &[("a", 1.0)]);
        let ctx = GateContext {
            decision: &sell,
            signals: &signals,
            volatility: 0.5,
        };
        assert!(rule.check(&ctx).is_ok());

        let buy = decision(Action::Buy, &[("a", 1.0)]);
        let ctx = GateContext {
            decision: &buy,
            signals: &signals,
            volatility: 0.10,
        };
        let v = rule.check(&ctx).unwrap_err();
        assert_eq!(v.rule, "volatility_ceiling_buy");
        assert_eq!(v.to_string(), "Volatility 10.00% exceeds BUY threshold 5.00%");
    }

    #[test]
    fn volatility_at_ceiling_passes() {
        let rule = VolatilityCeiling {
            action: Action::Sell,
            max_volatility: 0.08,
        };
        let signals = one_signal();
        let sell = decision(Action::Sell, &[("a", 1.0)]);
        let ctx = GateContext {
            decision: &sell,
            signals: &signals,
            volatility: 0.08,
        };
        assert!(rule.check(&ctx).is_ok());
    }

    #[test]
    fn confidence_floor_ignores_hold_and_empty_weights() {
        let rule = ConfidenceFloor { min_weight: 0.15 };
        let signals = one_signal();

        let hold = decision(Action::Hold, &[("a", 0.1), ("b", 0.9)]);
        let empty = decision(Action::Buy, &[]);
        for d in [&hold, &empty] {
            let ctx = GateContext {
                decision: d,
                signals: &signals,
                volatility: 0.0,
            };
            assert!(rule.check(&ctx).is_ok());
        }
    }

    #[test]
    fn signals_present_fires_on_empty_map() {
        let empty = SignalMap::new();
        let buy = decision(Action::Buy, &[]);
        let ctx = GateContext {
            decision: &buy,
            signals: &empty,
            volatility: 0.0,
        };
        assert_eq!(
            SignalsPresent.check(&ctx).unwrap_err().reason,
            "No signals available - safety override to HOLD"
        );
    }
}
