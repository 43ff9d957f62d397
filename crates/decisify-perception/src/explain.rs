//! Natural-language explanation of a finished [`Decision`].

use decisify_types::{Decision, SignalMap};

/// Weight above which a non-dominant source is called "supporting".
pub const SUPPORTING_WEIGHT: f64 = 0.15;

const EXCERPT_CHARS: usize = 80;

const NO_SIGNALS: &str = "No signals available - maintaining neutral position for safety.";

/// Narrate `decision` for an operator.
///
/// Never fails: a `reasoning` string without a parsable weighted value is
/// treated as a weighted value of zero.
///
/// ```
/// use chrono::Utc;
/// use decisify_perception::explain_decision;
/// use decisify_types::Decision;
///
/// let d = Decision::neutral(Utc::now());
/// assert!(explain_decision(&d, &Default::default()).starts_with("No signals available"));
/// ```
pub fn explain_decision(decision: &Decision, signals: &SignalMap) -> String {
    let Some((dominant, weight)) = decision.dominant_source() else {
        return NO_SIGNALS.to_string();
    };
    let dominant_signal = signals.get(dominant);

    let strength = match weighted_value_from(decision.reasoning()) {
        v if v > 0.5 => "strong",
        v if v > 0.3 => "moderate",
        _ => "weak",
    };

    let mut parts = vec![format!(
        "I decided to {} based on {strength} signals from multiple sources.",
        decision.action()
    )];

    if let Some(signal) = dominant_signal {
        let direction = if signal.value() > 0.0 { "positive" } else { "negative" };
        parts.push(format!(
            "The primary factor was {dominant} showing {direction} sentiment \
             (weight: {:.1}%, value: {:.2}).",
            weight * 100.0,
            signal.value()
        ));
    }

    let supporting: Vec<&str> = decision
        .weights()
        .iter()
        .filter(|(src, w)| src.as_str() != dominant && **w > SUPPORTING_WEIGHT)
        .map(|(src, _)| src.as_str())
        .collect();
    if !supporting.is_empty() {
        parts.push(format!(
            "Supporting signals from {} reinforced this decision.",
            supporting.join(", ")
        ));
    }

    match decision.override_reason() {
        None => parts.push("All safety checks passed.".to_string()),
        Some(reason) => parts.push(format!("Safety override applied: {reason}")),
    }

    if let Some(content) = dominant_signal.and_then(|s| s.raw_content()) {
        if !content.is_empty() {
            let excerpt: String = content.chars().take(EXCERPT_CHARS).collect();
            parts.push(format!("Context: \"{excerpt}...\""));
        }
    }

    parts.join(" ")
}

fn weighted_value_from(reasoning: &str) -> f64 {
    reasoning
        .split_once("Weighted signal: ")
        .and_then(|(_, rest)| rest.split(" |").next())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(f64::abs)
        .unwrap_or(0.0)
}
