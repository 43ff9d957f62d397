//! Signal sources – the pluggable feeds polled by the
//! [`PerceptionHub`][crate::hub::PerceptionHub].
//!
//! # Overview
//!
//! - [`SignalSource`] – the trait every feed implements.  A source has a
//!   stable name and an async `fetch` that may fail.
//! - [`SourceError`] – why a fetch failed.  Only [`SourceError::Timeout`]
//!   and [`SourceError::Transport`] are worth retrying.
//! - [`SimulatedSource`] – randomized stand-ins for the sentiment,
//!   volatility and news feeds.
//! - [`FlakySource`] – a simulated feed that times out at a configurable
//!   rate, for exercising the retry path.
//! - [`HttpSource`] – polls a JSON endpoint through the hub's shared client.
//! - [`FnSource`] – wraps a closure, for embedding and tests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use decisify_types::Signal;
use futures_util::future::BoxFuture;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use thiserror::Error;

/// Name of the built-in social sentiment feed.
pub const SENTIMENT_SOURCE: &str = "twitter_sentiment";
/// Name of the built-in price volatility feed.
pub const VOLATILITY_SOURCE: &str = "price_volatility";
/// Name of the built-in news sentiment feed.
pub const NEWS_SOURCE: &str = "news_feed";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single fetch attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The attempt did not finish within the sensor timeout.
    #[error("request timed out")]
    Timeout,
    /// A transient network / I/O problem.
    #[error("transport error: {0}")]
    Transport(String),
    /// Anything else: malformed payloads, invalid values, programming errors.
    #[error("{0}")]
    Permanent(String),
}

impl SourceError {
    /// `true` for the failure classes the hub retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Timeout | SourceError::Transport(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_connect() || e.is_request() || e.is_body() {
            SourceError::Transport(e.to_string())
        } else {
            SourceError::Permanent(e.to_string())
        }
    }
}

impl From<decisify_types::DecisifyError> for SourceError {
    fn from(e: decisify_types::DecisifyError) -> Self {
        SourceError::Permanent(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A feed the hub can poll once per decision cycle.
///
/// # Contract
///
/// * `name` – the key under which this source's signal is published.  Must
///   be unique within one hub.
/// * `fetch` – produce one [`Signal`].  `client` is the hub's shared HTTP
///   client; sources that do not touch the network may ignore it.  The hub
///   bounds every call with its own timeout, so implementations need not.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, client: &reqwest::Client) -> Result<Signal, SourceError>;
}

/// The three simulated feeds used when no real sources are configured.
pub fn default_sources() -> Vec<Box<dyn SignalSource>> {
    vec![
        Box::new(SimulatedSource::sentiment()),
        Box::new(SimulatedSource::volatility()),
        Box::new(SimulatedSource::news()),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// SimulatedSource
// ─────────────────────────────────────────────────────────────────────────────

const MOCK_TWEETS: &[&str] = &[
    "Market looking bullish! 🚀",
    "Concerns about volatility today...",
    "Strong fundamentals, holding long term",
    "Profit taking in progress",
];

const MOCK_HEADLINES: &[&str] = &[
    "Tech sector shows strong growth",
    "Regulatory concerns emerge",
    "Analysts upgrade price targets",
    "Market consolidation continues",
];

#[derive(Debug, Clone, Copy)]
enum ContentStyle {
    Pick(&'static [&'static str]),
    VolatilityPercent,
}

/// A randomized feed that mimics network latency and a bounded value range.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    name: String,
    min_value: f64,
    max_value: f64,
    min_latency: Duration,
    max_latency: Duration,
    content: ContentStyle,
}

impl SimulatedSource {
    /// Social sentiment in `[-1, 1]`, 100–500 ms latency.
    pub fn sentiment() -> Self {
        Self {
            name: SENTIMENT_SOURCE.to_string(),
            min_value: -1.0,
            max_value: 1.0,
            min_latency: Duration::from_millis(100),
            max_latency: Duration::from_millis(500),
            content: ContentStyle::Pick(MOCK_TWEETS),
        }
    }

    /// Price volatility in `[0, 0.15]`, 100–300 ms latency.
    pub fn volatility() -> Self {
        Self {
            name: VOLATILITY_SOURCE.to_string(),
            min_value: 0.0,
            max_value: 0.15,
            min_latency: Duration::from_millis(100),
            max_latency: Duration::from_millis(300),
            content: ContentStyle::VolatilityPercent,
        }
    }

    /// Headline sentiment in `[-0.5, 0.8]`, 200–600 ms latency.
    pub fn news() -> Self {
        Self {
            name: NEWS_SOURCE.to_string(),
            min_value: -0.5,
            max_value: 0.8,
            min_latency: Duration::from_millis(200),
            max_latency: Duration::from_millis(600),
            content: ContentStyle::Pick(MOCK_HEADLINES),
        }
    }

    /// Override the simulated latency range (builder-style).
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    fn sample(&self) -> (Duration, f64, String) {
        let mut rng = rand::thread_rng();
        let latency = if self.max_latency > self.min_latency {
            rng.gen_range(self.min_latency..=self.max_latency)
        } else {
            self.min_latency
        };
        let value = rng.gen_range(self.min_value..=self.max_value);
        let content = match self.content {
            ContentStyle::Pick(options) => options
                .choose(&mut rng)
                .copied()
                .unwrap_or_default()
                .to_string(),
            ContentStyle::VolatilityPercent => format!("Volatility: {:.2}%", value * 100.0),
        };
        (latency, value, content)
    }
}

#[async_trait]
impl SignalSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _client: &reqwest::Client) -> Result<Signal, SourceError> {
        // Sample before awaiting: the thread-local RNG must not cross an await.
        let (latency, value, content) = self.sample();
        tokio::time::sleep(latency).await;
        Ok(Signal::new(self.name.clone(), value, Utc::now(), Some(content))?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlakySource
// ─────────────────────────────────────────────────────────────────────────────

/// Simulated feed that fails with [`SourceError::Timeout`] with probability
/// `failure_rate` and otherwise yields a uniform value in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct FlakySource {
    name: String,
    failure_rate: f64,
    latency: Duration,
}

impl FlakySource {
    pub fn new(name: impl Into<String>, failure_rate: f64) -> Self {
        Self {
            name: name.into(),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            latency: Duration::from_millis(50),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl SignalSource for FlakySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _client: &reqwest::Client) -> Result<Signal, SourceError> {
        let (fails, value) = {
            let mut rng = rand::thread_rng();
            (rng.gen_bool(self.failure_rate), rng.gen_range(-1.0..=1.0))
        };
        if fails {
            return Err(SourceError::Timeout);
        }
        tokio::time::sleep(self.latency).await;
        Ok(Signal::new(
            self.name.clone(),
            value,
            Utc::now(),
            Some(format!("Mock data from {}", self.name)),
        )?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpSource
// ─────────────────────────────────────────────────────────────────────────────

/// JSON body expected from an [`HttpSource`] endpoint.
#[derive(Debug, Deserialize)]
struct Reading {
    value: f64,
    #[serde(default)]
    content: Option<String>,
}

/// Polls `GET <url>` and expects `{"value": <number>, "content": <string?>}`.
///
/// Connection failures are retryable transport errors.  Non-2xx statuses,
/// an unparsable body or a non-finite value are permanent.
#[derive(Debug, Clone)]
pub struct HttpSource {
    name: String,
    url: String,
}

impl HttpSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SignalSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Signal, SourceError> {
        let reading: Reading = client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Signal::new(self.name.clone(), reading.value, Utc::now(), reading.content)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FnSource
// ─────────────────────────────────────────────────────────────────────────────

type FetchFn = Box<dyn Fn() -> BoxFuture<'static, Result<Signal, SourceError>> + Send + Sync>;

/// Adapts a `(name, closure)` pair into a [`SignalSource`].
///
/// ```
/// use chrono::Utc;
/// use decisify_perception::{FnSource, SignalSource, SourceError};
/// use decisify_types::Signal;
///
/// let src = FnSource::new("constant", || async {
///     Ok::<_, SourceError>(Signal::new("constant", 0.5, Utc::now(), None)?)
/// });
/// assert_eq!(src.name(), "constant");
/// ```
pub struct FnSource {
    name: String,
    fetch: FetchFn,
}

impl FnSource {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Signal, SourceError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            fetch: Box::new(move || Box::pin(f())),
        }
    }
}

#[async_trait]
impl SignalSource for FnSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _client: &reqwest::Client) -> Result<Signal, SourceError> {
        (self.fetch)().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
