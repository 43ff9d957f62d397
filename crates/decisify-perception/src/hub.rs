//! [`PerceptionHub`] – concurrent, retrying acquisition of one signal per
//! configured source.
//!
//! Every cycle the hub launches one fetch per source, waits for all of them
//! (a failing source never short-circuits the others) and returns a map with
//! exactly the configured keys.  A source that keeps failing is represented
//! by a [null signal][decisify_types::Signal::null] rather than an error.
//! A source that panics is treated like a permanent failure.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use decisify_metrics::MetricsCollector;
use decisify_types::{DecisifyError, Signal, SignalMap};
use futures_util::FutureExt;
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::retry::{FetchState, RetryPolicy};
use crate::source::{SignalSource, SourceError};

/// Timeout and retry settings shared by every source of one hub.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HubConfig {
    /// Upper bound on a single fetch attempt.
    pub timeout: Duration,
    /// Total attempts per fetch, including the first.
    pub max_retries: u32,
    /// Base of the exponential backoff between attempts.
    pub retry_delay: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl HubConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

/// Fans out to a fixed set of [`SignalSource`]s.
///
/// The hub owns the single shared [`reqwest::Client`] handed to every
/// source.  [`close`](Self::close) consumes the hub, so the client can only
/// be released once.
///
/// ```no_run
/// # async fn demo() -> Result<(), decisify_types::DecisifyError> {
/// use std::sync::Arc;
/// use decisify_metrics::MetricsCollector;
/// use decisify_perception::{HubConfig, PerceptionHub, default_sources};
///
/// let metrics = Arc::new(MetricsCollector::default());
/// let hub = PerceptionHub::new(default_sources(), HubConfig::default(), metrics)?;
/// let signals = hub.fetch_all().await;
/// assert_eq!(signals.len(), 3);
/// hub.close();
/// # Ok(())
/// # }
/// ```
pub struct PerceptionHub {
    sources: Vec<Box<dyn SignalSource>>,
    config: HubConfig,
    policy: RetryPolicy,
    client: reqwest::Client,
    metrics: Arc<MetricsCollector>,
}

impl PerceptionHub {
    /// Build a hub over `sources`.
    ///
    /// # Errors
    ///
    /// * [`DecisifyError::InvalidSignal`] if a source name is blank.
    /// * [`DecisifyError::DuplicateSource`] if two sources share a name.
    /// * [`DecisifyError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(
        sources: Vec<Box<dyn SignalSource>>,
        config: HubConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, DecisifyError> {
        let mut seen = BTreeSet::new();
        for source in &sources {
            let name = source.name();
            if name.trim().is_empty() {
                return Err(DecisifyError::InvalidSignal(
                    "source name must not be empty".into(),
                ));
            }
            if !seen.insert(name.to_string()) {
                return Err(DecisifyError::DuplicateSource(name.to_string()));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DecisifyError::InvalidConfig(format!("HTTP client: {e}")))?;

        info!(
            sources = sources.len(),
            timeout_ms = config.timeout.as_millis() as u64,
            "perception hub ready"
        );
        Ok(Self {
            sources,
            policy: config.retry_policy(),
            config,
            client,
            metrics,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Configured source names, in registration order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch one signal from every source concurrently.
    ///
    /// Never fails; the result has exactly one entry per configured source.
    pub async fn fetch_all(&self) -> SignalMap {
        let fetches = self.sources.iter().map(|s| self.fetch_one(s.as_ref()));
        let signals = join_all(fetches).await;
        signals
            .into_iter()
            .map(|signal| (signal.source().to_string(), signal))
            .collect()
    }

    async fn fetch_one(&self, source: &dyn SignalSource) -> Signal {
        let name = source.name();
        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let fetch = AssertUnwindSafe(source.fetch(&self.client)).catch_unwind();
            let outcome = match tokio::time::timeout(self.config.timeout, fetch).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(SourceError::Permanent(format!(
                    "source panicked: {}",
                    panic_message(panic.as_ref())
                ))),
                Err(_) => Err(SourceError::Timeout),
            };
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            match self.policy.advance(attempt, outcome) {
                FetchState::Succeeded(signal) => {
                    self.metrics.record_sensor_success(name, elapsed_ms);
                    debug!(source = name, attempt, latency_ms = elapsed_ms, "signal fetched");
                    return if signal.source() == name {
                        signal
                    } else {
                        signal.with_source(name)
                    };
                }
                FetchState::Attempting(next) => {
                    let delay = self.policy.delay(attempt - 1);
                    warn!(
                        source = name,
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        retry_in_ms = delay.as_millis() as u64,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                FetchState::Exhausted(cause) => {
                    self.metrics.record_sensor_failure(name);
                    error!(
                        source = name,
                        attempts = attempt,
                        error = %cause,
                        "fetch failed, using null signal"
                    );
                    return Signal::null(name, cause, Utc::now());
                }
            }
        }
    }

    /// Release the shared HTTP client.
    pub fn close(self) {
        info!(sources = self.sources.len(), "perception hub closed");
        drop(self.client);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
