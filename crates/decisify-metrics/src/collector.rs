//! [`MetricsCollector`] – windowed latencies and all-time counters.
//!
//! Latency samples (decision cycles, per-source sensor fetches, API reads)
//! live in fixed-capacity windows; once a window is full the oldest sample is
//! evicted.  Counters (decisions, sensor successes/failures, safety
//! passes/overrides, API requests) are never evicted.
//!
//! Snapshots mix the two: latency averages describe only the
//! retained window, while rates such as a sensor's success rate are computed
//! from all-time counts.
//!
//! # Example
//!
//! ```
//! use decisify_metrics::MetricsCollector;
//!
//! let metrics = MetricsCollector::new(2);
//! metrics.record_sensor_success("news_feed", 10.0);
//! metrics.record_sensor_success("news_feed", 20.0);
//! metrics.record_sensor_success("news_feed", 30.0); // evicts 10.0
//! metrics.record_sensor_failure("news_feed");
//!
//! let snap = metrics.snapshot();
//! let news = &snap.sensors["news_feed"];
//! assert_eq!(news.avg_latency_ms, 25.0);
//! assert_eq!(news.success_rate, 0.75);
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Window capacity used by [`MetricsCollector::default`].
pub const DEFAULT_WINDOW_SIZE: usize = 100;

// ────────────────────────────────────────────────────────────────────────────
// Snapshot types
// ────────────────────────────────────────────────────────────────────────────

/// Decision-cycle statistics.  `count` is all-time; latencies are windowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    pub count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
}

/// Per-source sensor statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorStats {
    pub success_count: u64,
    pub failure_count: u64,
    /// `success / (success + failure)` over all-time counts.
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
}

/// Safety gate outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyStats {
    pub passes: u64,
    pub overrides: u64,
    pub override_rate: f64,
}

/// Read-side request statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStats {
    pub request_count: u64,
    pub avg_latency_ms: f64,
}

/// Point-in-time aggregate of everything the collector tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub decision: DecisionStats,
    pub sensors: BTreeMap<String, SensorStats>,
    pub safety: SafetyStats,
    pub api: ApiStats,
    pub timestamp: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Latency window
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct LatencyWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, sample_ms: f64) {
        self.samples.push_back(sample_ms);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// `(avg, min, max)` over retained samples; zeros when empty.
    fn stats(&self) -> (f64, f64, f64) {
        if self.samples.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let sum: f64 = self.samples.iter().sum();
        let min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (sum / self.samples.len() as f64, min, max)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Collector
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SensorCounters {
    latencies: Option<LatencyWindow>,
    successes: u64,
    failures: u64,
}

#[derive(Debug)]
struct Inner {
    window_size: usize,
    decision_latencies: LatencyWindow,
    decision_count: u64,
    sensors: HashMap<String, SensorCounters>,
    safety_passes: u64,
    safety_overrides: u64,
    api_latencies: LatencyWindow,
    api_request_count: u64,
}

/// Thread-safe metrics sink shared by the hub, the gate, the orchestrator and
/// the read API.
///
/// Every recording method takes `&self`; a single internal mutex makes
/// concurrent increments from parallel sensor fetches safe.
#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl MetricsCollector {
    /// Create a collector whose latency windows retain `window_size` samples
    /// (at least one).
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            inner: Mutex::new(Inner {
                window_size,
                decision_latencies: LatencyWindow::new(window_size),
                decision_count: 0,
                sensors: HashMap::new(),
                safety_passes: 0,
                safety_overrides: 0,
                api_latencies: LatencyWindow::new(window_size),
                api_request_count: 0,
            }),
        }
    }

    /// The configured latency window capacity.
    pub fn window_size(&self) -> usize {
        self.lock().window_size
    }

    pub fn record_decision_latency(&self, latency_ms: f64) {
        let mut inner = self.lock();
        inner.decision_latencies.push(latency_ms);
        inner.decision_count += 1;
    }

    pub fn record_sensor_success(&self, source: &str, latency_ms: f64) {
        let mut inner = self.lock();
        let window_size = inner.window_size;
        let counters = inner.sensors.entry(source.to_string()).or_default();
        counters
            .latencies
            .get_or_insert_with(|| LatencyWindow::new(window_size))
            .push(latency_ms);
        counters.successes += 1;
    }

    pub fn record_sensor_failure(&self, source: &str) {
        let mut inner = self.lock();
        inner.sensors.entry(source.to_string()).or_default().failures += 1;
    }

    pub fn record_safety_pass(&self) {
        self.lock().safety_passes += 1;
    }

    pub fn record_safety_override(&self) {
        self.lock().safety_overrides += 1;
    }

    pub fn record_api_request(&self, latency_ms: f64) {
        let mut inner = self.lock();
        inner.api_latencies.push(latency_ms);
        inner.api_request_count += 1;
    }

    /// Aggregate all counters into a [`MetricsSnapshot`].
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();

        let (avg, min, max) = inner.decision_latencies.stats();
        let decision = DecisionStats {
            count: inner.decision_count,
            avg_latency_ms: avg,
            min_latency_ms: min,
            max_latency_ms: max,
        };

        let sensors = inner
            .sensors
            .iter()
            .map(|(source, c)| {
                let total = c.successes + c.failures;
                let (avg, min, max) = c
                    .latencies
                    .as_ref()
                    .map_or((0.0, 0.0, 0.0), LatencyWindow::stats);
                let stats = SensorStats {
                    success_count: c.successes,
                    failure_count: c.failures,
                    success_rate: ratio(c.successes, total),
                    avg_latency_ms: avg,
                    min_latency_ms: min,
                    max_latency_ms: max,
                };
                (source.clone(), stats)
            })
            .collect();

        let safety = SafetyStats {
            passes: inner.safety_passes,
            overrides: inner.safety_overrides,
            override_rate: ratio(
                inner.safety_overrides,
                inner.safety_passes + inner.safety_overrides,
            ),
        };

        let api = ApiStats {
            request_count: inner.api_request_count,
            avg_latency_ms: inner.api_latencies.stats().0,
        };

        MetricsSnapshot {
            decision,
            sensors,
            safety,
            api,
            timestamp: Utc::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay meaningful even if a recording thread panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snap = MetricsCollector::new(10).snapshot();
        assert_eq!(snap.decision, DecisionStats::default());
        assert!(snap.sensors.is_empty());
        assert_eq!(snap.safety.override_rate, 0.0);
        assert_eq!(snap.api.request_count, 0);
    }

    #[test]
    fn decision_latency_window_evicts_oldest() {
        let m = MetricsCollector::new(3);
        for ms in [100.0, 1.0, 2.0, 3.0] {
            m.record_decision_latency(ms);
        }
        let d = m.snapshot().decision;
        assert_eq!(d.count, 4, "count is cumulative");
        assert_eq!(d.max_latency_ms, 3.0, "100.0 was evicted");
        assert_eq!(d.min_latency_ms, 1.0);
        assert!((d.avg_latency_ms - 2.0).abs() < 1e-12);
    }

    #[test]
    fn success_rate_uses_all_time_counts() {
        let m = MetricsCollector::new(1);
        for _ in 0..3 {
            m.record_sensor_success("twitter_sentiment", 5.0);
        }
        m.record_sensor_failure("twitter_sentiment");
        let s = &m.snapshot().sensors["twitter_sentiment"];
        assert_eq!(s.success_count, 3);
        assert_eq!(s.failure_count, 1);
        assert!((s.success_rate - 0.75).abs() < 1e-12);
    }

    #[test]
    fn failure_only_source_appears_with_zero_latency() {
        let m = MetricsCollector::new(5);
        m.record_sensor_failure("price_volatility");
        let s = &m.snapshot().sensors["price_volatility"];
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.avg_latency_ms, 0.0);
    }

    #[test]
    fn safety_override_rate() {
        let m = MetricsCollector::default();
        m.record_safety_pass();
        m.record_safety_pass();
        m.record_safety_pass();
        m.record_safety_override();
        let s = m.snapshot().safety;
        assert_eq!(s.passes, 3);
        assert_eq!(s.overrides, 1);
        assert!((s.override_rate - 0.25).abs() < 1e-12);
    }

    #[test]
    fn api_stats_average_window() {
        let m = MetricsCollector::new(2);
        m.record_api_request(1.0);
        m.record_api_request(3.0);
        m.record_api_request(5.0);
        let a = m.snapshot().api;
        assert_eq!(a.request_count, 3);
        assert!((a.avg_latency_ms - 4.0).abs() < 1e-12);
    }

    #[test]
    fn zero_window_is_clamped_to_one() {
        let m = MetricsCollector::new(0);
        assert_eq!(m.window_size(), 1);
        m.record_decision_latency(7.0);
        m.record_decision_latency(9.0);
        assert_eq!(m.snapshot().decision.avg_latency_ms, 9.0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let m = Arc::new(MetricsCollector::new(10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..250 {
                        m.record_sensor_success("news_feed", 1.0);
                        m.record_safety_pass();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = m.snapshot();
        assert_eq!(snap.sensors["news_feed"].success_count, 2000);
        assert_eq!(snap.safety.passes, 2000);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let m = MetricsCollector::default();
        m.record_decision_latency(12.5);
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        assert!(json.contains("\"decision\""));
        assert!(json.contains("avg_latency_ms"));
    }
}
