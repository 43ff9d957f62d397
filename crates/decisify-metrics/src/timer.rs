//! [`ScopedTimer`] – records how long a scope took when it ends.
//!
//! The timer hands its elapsed time to a callback from [`Drop`], so the
//! measurement is reported whether the scope returns normally, exits early
//! through `?`, or unwinds.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use decisify_metrics::{MetricsCollector, ScopedTimer};
//!
//! let metrics = Arc::new(MetricsCollector::default());
//! {
//!     let m = Arc::clone(&metrics);
//!     let _timer = ScopedTimer::new(move |ms| m.record_api_request(ms));
//!     // ... work ...
//! }
//! assert_eq!(metrics.snapshot().api.request_count, 1);
//! ```

use std::time::Instant;

/// Measures the lifetime of a scope and reports it, in milliseconds, to
/// `on_finish` exactly once.
pub struct ScopedTimer<F>
where
    F: FnOnce(f64),
{
    start: Instant,
    on_finish: Option<F>,
}

impl<F> ScopedTimer<F>
where
    F: FnOnce(f64),
{
    /// Start timing now.
    pub fn new(on_finish: F) -> Self {
        Self {
            start: Instant::now(),
            on_finish: Some(on_finish),
        }
    }

    /// Milliseconds elapsed so far.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stop the timer now and return the recorded duration.
    pub fn finish(mut self) -> f64 {
        self.report()
    }

    /// Stop the timer without reporting anything.
    pub fn cancel(mut self) {
        self.on_finish = None;
    }

    fn report(&mut self) -> f64 {
        let elapsed = self.elapsed_ms();
        if let Some(cb) = self.on_finish.take() {
            cb(elapsed);
        }
        elapsed
    }
}

impl<F> Drop for ScopedTimer<F>
where
    F: FnOnce(f64),
{
    fn drop(&mut self) {
        self.report();
    }
}
