//! [`ReadApi`] – the read side consumed by external servers and dashboards.
//!
//! Nothing here speaks HTTP; each method returns the value an endpoint would
//! serialize.  Until the first cycle completes, `status`, `decision` and
//! `signals` report [`Readout::NotReady`].  `metrics` is always available.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use decisify_metrics::{MetricsCollector, MetricsSnapshot, ScopedTimer};
use decisify_types::{Action, Decision, SignalMap};
use serde::Serialize;

use crate::state::{StateStore, SystemState};

/// Confidence reported when there are no weights to take it from.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Either a value or "nothing published yet".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Readout<T> {
    NotReady,
    Ready(T),
}

impl<T> Readout<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readout::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Readout::Ready(v) => Some(v),
            Readout::NotReady => None,
        }
    }
}

/// Dashboard summary of the latest decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentThought {
    /// `thought_<cycle>`, zero-padded to three digits.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    /// The explanation when present, otherwise the fusion reasoning.
    pub reasoning: String,
    /// Raw value per source.
    pub inputs: BTreeMap<String, f64>,
    /// Largest attention weight, or 0.5 when there are none.
    pub confidence: f64,
    pub is_safe: bool,
}

/// Everything about the latest cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub decision: Decision,
    pub signals: SignalMap,
    pub cycle_count: u64,
    pub last_update: DateTime<Utc>,
    pub thought: AgentThought,
}

impl StatusReport {
    fn from_state(state: &SystemState) -> Option<Self> {
        let decision = state.latest_decision.clone()?;
        let thought = AgentThought {
            id: format!("thought_{:03}", state.cycle_count),
            timestamp: decision.timestamp(),
            action: decision.action(),
            reasoning: decision
                .explanation()
                .unwrap_or(decision.reasoning())
                .to_string(),
            inputs: state
                .latest_signals
                .iter()
                .map(|(k, s)| (k.clone(), s.value()))
                .collect(),
            confidence: decision.max_weight().unwrap_or(DEFAULT_CONFIDENCE),
            is_safe: decision.is_safe(),
        };
        Some(Self {
            decision,
            signals: state.latest_signals.clone(),
            cycle_count: state.cycle_count,
            last_update: state.last_update,
            thought,
        })
    }
}

/// Read-only view over the published state and metrics.
#[derive(Debug, Clone)]
pub struct ReadApi {
    store: StateStore,
    metrics: Arc<MetricsCollector>,
}

impl ReadApi {
    pub fn new(store: StateStore, metrics: Arc<MetricsCollector>) -> Self {
        Self { store, metrics }
    }

    pub fn status(&self) -> Readout<StatusReport> {
        self.timed(StatusReport::from_state)
    }

    pub fn decision(&self) -> Readout<Decision> {
        self.timed(|state| state.latest_decision.clone())
    }

    pub fn signals(&self) -> Readout<SignalMap> {
        self.timed(|state| {
            if state.latest_signals.is_empty() {
                None
            } else {
                Some(state.latest_signals.clone())
            }
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn timed<T>(&self, read: impl FnOnce(&SystemState) -> Option<T>) -> Readout<T> {
        let metrics = Arc::clone(&self.metrics);
        let _timer = ScopedTimer::new(move |ms| metrics.record_api_request(ms));
        let state = self.store.read();
        match read(state.as_ref()) {
            Some(v) => Readout::Ready(v),
            None => Readout::NotReady,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decisify_types::{Signal, Weights};

    fn api() -> (ReadApi, StateStore, Arc<MetricsCollector>) {
        let store = StateStore::new();
        let metrics = Arc::new(MetricsCollector::default());
        (ReadApi::new(store.clone(), Arc::clone(&metrics)), store, metrics)
    }

    fn publish(store: &StateStore, decision: Decision, signals: SignalMap) {
        store.publish(store.read().advance(decision, signals, Utc::now()));
    }

    #[test]
    fn not_ready_before_first_cycle() {
        let (api, _, metrics) = api();
        assert_eq!(api.status(), Readout::NotReady);
        assert_eq!(api.decision(), Readout::NotReady);
        assert_eq!(api.signals(), Readout::NotReady);
        assert_eq!(api.metrics().decision.count, 0);
        // metrics() itself is not counted
        assert_eq!(metrics.snapshot().api.request_count, 3);
    }

    #[test]
    fn status_after_publish() {
        let (api, store, _) = api();
        let now = Utc::now();
        let mut signals = SignalMap::new();
        for (name, value) in [("twitter_sentiment", 0.8), ("news_feed", 0.1)] {
            signals.insert(name.into(), Signal::new(name, value, now, None).unwrap());
        }
        let weights: Weights = [("twitter_sentiment", 0.7), ("news_feed", 0.3)]
            .into_iter()
            .map(|(k, w)| (k.to_string(), w))
            .collect();
        let decision = Decision::proposed(now, weights, Action::Buy, "Weighted signal: 0.590")
            .with_explanation("I decided to BUY");
        publish(&store, decision.clone(), signals);

        let report = api.status().ready().unwrap();
        assert_eq!(report.cycle_count, 1);
        assert_eq!(report.decision, decision);
        assert_eq!(report.thought.id, "thought_001");
        assert_eq!(report.thought.confidence, 0.7);
        assert_eq!(report.thought.reasoning, "I decided to BUY");
        assert_eq!(report.thought.inputs["twitter_sentiment"], 0.8);
        assert!(api.decision().is_ready());
        assert_eq!(api.signals().ready().unwrap().len(), 2);
    }

    #[test]
    fn neutral_decision_reports_default_confidence_and_no_signals() {
        let (api, store, _) = api();
        publish(&store, Decision::neutral(Utc::now()), SignalMap::new());

        let report = api.status().ready().unwrap();
        assert_eq!(report.thought.confidence, 0.5);
        assert!(report.thought.reasoning.starts_with("All signals null"));
        assert_eq!(api.signals(), Readout::NotReady);
    }

    #[test]
    fn readout_serializes_with_status_tag() {
        let json = serde_json::to_value(Readout::<u8>::NotReady).unwrap();
        assert_eq!(json["status"], "not_ready");
        let json = serde_json::to_value(Readout::Ready(7u8)).unwrap();
        assert_eq!(json["data"], 7);
    }
}
