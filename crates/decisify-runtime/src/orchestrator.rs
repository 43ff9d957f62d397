//! [`Orchestrator`] – drives the fetch → fuse → validate → publish cycle.
//!
//! Each cycle:
//!
//! 1. **Perceive** – [`PerceptionHub::fetch_all`] polls every source
//!    concurrently.  Failing sources come back as null signals.
//! 2. **Fuse** – the configured [`FusionEngine`] turns the signal map into a
//!    proposed [`Decision`].
//! 3. **Gate** – [`SafetyGate::validate`] may replace it with a `HOLD`
//!    override.
//! 4. **Explain & publish** – the explanation is attached and the complete
//!    new [`SystemState`] is swapped into the [`StateStore`].
//!
//! The loop then sleeps for `cycle_interval`.  Cycles never overlap.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──run()──▶ Running ──stop()──▶ Stopping ──hub closed──▶ Stopped
//! ```
//!
//! [`OrchestratorHandle::stop`] is observed before the next cycle starts and
//! also cuts the inter-cycle sleep short.  An in-flight cycle always
//! completes.
//!
//! # Example
//!
//! ```rust,no_run
//! use decisify_perception::default_sources;
//! use decisify_runtime::{Orchestrator, OrchestratorConfig};
//!
//! # async fn demo() -> Result<(), decisify_types::DecisifyError> {
//! let config = OrchestratorConfig::default();
//! let metrics = config.new_metrics();
//! let orchestrator = Orchestrator::new(config, default_sources(), metrics)?;
//! let handle = orchestrator.handle();
//! let task = tokio::spawn(orchestrator.run());
//! // ...
//! handle.stop();
//! # let _ = task.await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use decisify_kernel::{SafetyGate, SafetyThresholds};
use decisify_metrics::{DEFAULT_WINDOW_SIZE, MetricsCollector, ScopedTimer};
use decisify_perception::{
    FusionEngine, FusionPolicy, FusionVariant, HubConfig, PerceptionHub, SignalSource,
    build_fusion_engine,
};
use decisify_types::{DecisifyError, Decision};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::query::ReadApi;
use crate::state::{StateStore, SystemState};

/// Characters of signal content shown in per-cycle logs.
const LOG_CONTENT_CHARS: usize = 50;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the orchestrator needs at start-up.  Immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub cycle_interval: Duration,
    /// Softmax temperature of the fusion engine.
    pub agent_temperature: f64,
    pub fusion_variant: FusionVariant,
    pub fusion_policy: FusionPolicy,
    pub safety: SafetyThresholds,
    /// Sensor timeout and retry settings.
    pub hub: HubConfig,
    /// Samples kept per latency window.
    pub metrics_window_size: usize,
    /// Stop on its own after this many cycles.
    pub max_cycles: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(5),
            agent_temperature: 1.0,
            fusion_variant: FusionVariant::default(),
            fusion_policy: FusionPolicy::default(),
            safety: SafetyThresholds::default(),
            hub: HubConfig::default(),
            metrics_window_size: DEFAULT_WINDOW_SIZE,
            max_cycles: None,
        }
    }
}

impl OrchestratorConfig {
    /// A collector sized by `metrics_window_size`.
    pub fn new_metrics(&self) -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::new(self.metrics_window_size))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Running,
    /// Stop requested; the current cycle is finishing.
    Stopping,
}

/// Cloneable control and read handle for a running [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    lifecycle: Arc<watch::Sender<LifecycleState>>,
    store: StateStore,
    api: ReadApi,
}

impl OrchestratorHandle {
    /// Ask the loop to stop after the current cycle.  Safe to call from any
    /// thread, any number of times.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        self.lifecycle.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::Stopping;
                true
            } else {
                false
            }
        });
    }

    pub fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    /// Receiver notified on every lifecycle transition.
    pub fn watch_lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// The latest published snapshot.
    pub fn state(&self) -> Arc<SystemState> {
        self.store.read()
    }

    pub fn read_api(&self) -> &ReadApi {
        &self.api
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the pipeline components and the published state.
pub struct Orchestrator {
    config: OrchestratorConfig,
    hub: PerceptionHub,
    engine: Box<dyn FusionEngine>,
    gate: SafetyGate,
    store: StateStore,
    metrics: Arc<MetricsCollector>,
    stop_tx: Arc<watch::Sender<bool>>,
    lifecycle: Arc<watch::Sender<LifecycleState>>,
}

impl Orchestrator {
    /// Wire the hub, fusion engine and gate.
    ///
    /// # Errors
    ///
    /// [`DecisifyError::InvalidConfig`] for a bad temperature, policy or
    /// thresholds; [`DecisifyError::DuplicateSource`] or
    /// [`DecisifyError::InvalidSignal`] for bad source names.
    pub fn new(
        config: OrchestratorConfig,
        sources: Vec<Box<dyn SignalSource>>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, DecisifyError> {
        if config.cycle_interval.is_zero() {
            return Err(DecisifyError::InvalidConfig(
                "cycle_interval must be positive".into(),
            ));
        }
        config.safety.validate()?;
        let engine = build_fusion_engine(
            config.fusion_variant,
            config.agent_temperature,
            config.fusion_policy.clone(),
        )?;
        let gate = SafetyGate::new(config.safety, Arc::clone(&metrics))
            .with_volatility_keyword(config.fusion_policy.volatility_keyword.clone());
        let hub = PerceptionHub::new(sources, config.hub, Arc::clone(&metrics))?;

        let (stop_tx, _) = watch::channel(false);
        let (lifecycle, _) = watch::channel(LifecycleState::Stopped);

        info!(
            engine = engine.name(),
            temperature = engine.temperature(),
            sources = ?hub.source_names(),
            "orchestrator configured"
        );
        Ok(Self {
            config,
            hub,
            engine,
            gate,
            store: StateStore::new(),
            metrics,
            stop_tx: Arc::new(stop_tx),
            lifecycle: Arc::new(lifecycle),
        })
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            stop_tx: Arc::clone(&self.stop_tx),
            lifecycle: Arc::clone(&self.lifecycle),
            store: self.store.clone(),
            api: ReadApi::new(self.store.clone(), Arc::clone(&self.metrics)),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run cycles until stopped, then release the hub.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed cycle.  A failed cycle ends the loop;
    /// the hub is still closed.
    pub async fn run(self) -> Result<(), DecisifyError> {
        self.lifecycle.send_replace(LifecycleState::Running);
        info!(
            interval_ms = self.config.cycle_interval.as_millis() as u64,
            "orchestrator started"
        );

        let result = self.drive().await;

        let Orchestrator { hub, lifecycle, .. } = self;
        lifecycle.send_replace(LifecycleState::Stopping);
        hub.close();
        lifecycle.send_replace(LifecycleState::Stopped);
        info!("orchestrator stopped");
        result
    }

    async fn drive(&self) -> Result<(), DecisifyError> {
        let mut stop_rx = self.stop_tx.subscribe();
        let mut completed: u64 = 0;
        loop {
            if *stop_rx.borrow_and_update() {
                return Ok(());
            }
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "decision cycle failed, stopping");
                return Err(e);
            }
            completed += 1;
            if self.config.max_cycles.is_some_and(|max| completed >= max) {
                info!(cycles = completed, "cycle limit reached");
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle_interval) => {}
                _ = stop_rx.changed() => {}
            }
        }
    }

    /// Execute exactly one cycle and publish its result.
    ///
    /// Returns the newly published state.
    pub async fn run_cycle(&self) -> Result<Arc<SystemState>, DecisifyError> {
        let n = self.store.read().cycle_count + 1;
        let span = info_span!("cycle", n, id = %Uuid::new_v4());
        self.cycle().instrument(span).await
    }

    async fn cycle(&self) -> Result<Arc<SystemState>, DecisifyError> {
        let metrics = Arc::clone(&self.metrics);
        let timer = ScopedTimer::new(move |ms| metrics.record_decision_latency(ms));

        let signals = self.hub.fetch_all().await;
        for (source, signal) in &signals {
            let content: String = signal
                .raw_content()
                .map(|c| c.chars().take(LOG_CONTENT_CHARS).collect())
                .unwrap_or_else(|| "N/A".to_string());
            info!(source = %source, value = signal.value(), content = %content, "signal");
        }

        let proposed = self.engine.decide(&signals);
        let checked = self.gate.validate(&proposed, &signals);
        let explanation = self.engine.explain(&checked, &signals);
        let decision: Decision = checked.with_explanation(explanation);
        // Only published decisions count towards decision latency.
        if let Err(e) = decision.validate() {
            timer.cancel();
            return Err(DecisifyError::CycleFailed(e.to_string()));
        }

        let next = self.store.read().advance(decision, signals, Utc::now());
        self.store.publish(next);
        let published = self.store.read();
        if let Some(d) = &published.latest_decision {
            self.gate.log_decision(d);
        }

        let elapsed_ms = timer.finish();
        info!(latency_ms = elapsed_ms, cycle = published.cycle_count, "cycle completed");
        Ok(published)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use decisify_perception::{FnSource, SourceError};
    use decisify_types::{Action, Signal, SignalMap, Weights};

    /// Engine whose weights never sum to one.
    struct UnnormalizedFusion {
        policy: FusionPolicy,
    }

    impl FusionEngine for UnnormalizedFusion {
        fn name(&self) -> &'static str {
            "unnormalized"
        }

        fn temperature(&self) -> f64 {
            1.0
        }

        fn policy(&self) -> &FusionPolicy {
            &self.policy
        }

        fn decide_at(&self, _signals: &SignalMap, now: DateTime<Utc>) -> Decision {
            let weights: Weights = [("a".to_string(), 0.4)].into_iter().collect();
            Decision::proposed(now, weights, Action::Hold, "Weighted signal: 0.000")
        }
    }

    fn constant(name: &'static str, value: f64) -> Box<dyn SignalSource> {
        Box::new(FnSource::new(name, move || async move {
            let content = Some(format!("{name} reading"));
            Ok::<_, SourceError>(Signal::new(name, value, Utc::now(), content)?)
        }))
    }

    fn failing(name: &'static str) -> Box<dyn SignalSource> {
        Box::new(FnSource::new(name, || async {
            Err::<Signal, _>(SourceError::Timeout)
        }))
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            cycle_interval: Duration::from_millis(10),
            hub: HubConfig {
                timeout: Duration::from_millis(100),
                max_retries: 2,
                retry_delay: Duration::from_millis(1),
            },
            ..OrchestratorConfig::default()
        }
    }

    fn build(
        config: OrchestratorConfig,
        sources: Vec<Box<dyn SignalSource>>,
    ) -> (Orchestrator, Arc<MetricsCollector>) {
        let metrics = config.new_metrics();
        let o = Orchestrator::new(config, sources, Arc::clone(&metrics)).unwrap();
        (o, metrics)
    }

    #[tokio::test]
    async fn single_cycle_publishes_all_fields() {
        let (o, metrics) = build(fast_config(), vec![constant("twitter_sentiment", 0.8)]);
        let handle = o.handle();
        assert!(handle.read_api().status().ready().is_none());

        let state = o.run_cycle().await.unwrap();

        assert_eq!(state.cycle_count, 1);
        let d = state.latest_decision.as_ref().unwrap();
        assert_eq!(d.action(), Action::Buy);
        assert!(d.is_safe());
        assert!(d.explanation().unwrap().starts_with("I decided to BUY"));
        assert_eq!(state.latest_signals["twitter_sentiment"].value(), 0.8);
        assert_eq!(handle.state().cycle_count, 1);

        let snap = metrics.snapshot();
        assert_eq!(snap.decision.count, 1);
        assert_eq!(snap.safety.passes, 1);
    }

    #[tokio::test]
    async fn high_volatility_buy_is_published_as_hold() {
        let (o, metrics) = build(
            fast_config(),
            vec![constant("twitter_sentiment", 0.9), constant("price_volatility", 0.10)],
        );

        let state = o.run_cycle().await.unwrap();

        let d = state.latest_decision.as_ref().unwrap();
        assert_eq!(d.action(), Action::Hold);
        assert!(!d.is_safe());
        assert!(d.override_reason().unwrap().contains("Volatility"));
        assert_eq!(metrics.snapshot().safety.overrides, 1);
    }

    #[tokio::test]
    async fn all_sources_failing_still_publishes_neutral_decision() {
        let (o, metrics) = build(fast_config(), vec![failing("a"), failing("b")]);

        let state = o.run_cycle().await.unwrap();

        let d = state.latest_decision.as_ref().unwrap();
        assert_eq!(d.action(), Action::Hold);
        assert!(d.weights().is_empty());
        assert_eq!(state.latest_signals.len(), 2);
        assert!(state.latest_signals.values().all(Signal::is_null));
        assert_eq!(metrics.snapshot().sensors["a"].failure_count, 1);
    }

    #[tokio::test]
    async fn max_cycles_ends_run_and_closes() {
        let config = OrchestratorConfig {
            max_cycles: Some(3),
            ..fast_config()
        };
        let (o, _) = build(config, vec![constant("news_feed", 0.5)]);
        let handle = o.handle();
        let mut lifecycle = handle.watch_lifecycle();

        o.run().await.unwrap();

        assert_eq!(handle.state().cycle_count, 3);
        assert_eq!(handle.lifecycle(), LifecycleState::Stopped);
        assert!(lifecycle.has_changed().unwrap());
    }

    #[tokio::test]
    async fn stop_before_run_runs_no_cycles() {
        let (o, _) = build(fast_config(), vec![constant("news_feed", 0.5)]);
        let handle = o.handle();
        handle.stop();

        o.run().await.unwrap();

        assert_eq!(handle.state().cycle_count, 0);
        assert_eq!(handle.lifecycle(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn stop_interrupts_the_sleep() {
        let config = OrchestratorConfig {
            cycle_interval: Duration::from_secs(3600),
            ..fast_config()
        };
        let (o, _) = build(config, vec![constant("news_feed", 0.5)]);
        let handle = o.handle();
        let mut state_rx = handle.store.subscribe();
        let task = tokio::spawn(o.run());

        state_rx.changed().await.unwrap();
        assert_eq!(handle.lifecycle(), LifecycleState::Running);
        handle.stop();

        let result = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(result.expect("run did not stop").unwrap().is_ok());
        assert_eq!(handle.state().cycle_count, 1);
        assert_eq!(handle.lifecycle(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn invalid_decision_stops_the_loop_without_publishing() {
        let (mut o, metrics) = build(fast_config(), vec![constant("a", 0.5)]);
        o.engine = Box::new(UnnormalizedFusion {
            policy: FusionPolicy::default(),
        });
        let handle = o.handle();

        let result = o.run().await;

        assert!(matches!(result, Err(DecisifyError::CycleFailed(_))));
        assert_eq!(handle.state().cycle_count, 0);
        assert!(handle.state().latest_decision.is_none());
        assert_eq!(handle.lifecycle(), LifecycleState::Stopped);
        assert_eq!(metrics.snapshot().decision.count, 0);
    }

        #[test]
    fn rejects_invalid_configuration() {
        let metrics = Arc::new(MetricsCollector::default());
        let bad_temp = OrchestratorConfig {
            agent_temperature: 0.0,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(
            Orchestrator::new(bad_temp, vec![constant("a", 0.1)], Arc::clone(&metrics)),
            Err(DecisifyError::InvalidConfig(_))
        ));

        let dup = Orchestrator::new(
            OrchestratorConfig::default(),
            vec![constant("a", 0.1), constant("a", 0.2)],
            metrics,
        );
        assert!(matches!(dup, Err(DecisifyError::DuplicateSource(_))));
    }
}
