//! Exponential-backoff retry policy for a single source fetch.
//!
//! The policy is a pure state machine: the hub feeds it the outcome of each
//! attempt via [`RetryPolicy::advance`] and sleeps for
//! [`RetryPolicy::delay`] whenever it is told to try again.

use std::time::Duration;

use decisify_types::Signal;

use crate::source::SourceError;

/// Where a fetch stands after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState {
    /// Try again; the payload is the 1-based number of the next attempt.
    Attempting(u32),
    Succeeded(Signal),
    /// No attempts left, or the last failure was not retryable.
    Exhausted(SourceError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Backoff before retry `n` (0-based): `base_delay × 2ⁿ`, saturating.
    pub fn delay(&self, n: u32) -> Duration {
        let factor = 2u32.checked_pow(n).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Transition after attempt number `attempt` (1-based) produced `outcome`.
    pub fn advance(&self, attempt: u32, outcome: Result<Signal, SourceError>) -> FetchState {
        match outcome {
            Ok(signal) => FetchState::Succeeded(signal),
            Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                FetchState::Attempting(attempt + 1)
            }
            Err(e) => FetchState::Exhausted(e),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn delay_doubles() {
        let p = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(p.delay(0), Duration::from_millis(500));
        assert_eq!(p.delay(1), Duration::from_millis(1000));
        assert_eq!(p.delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let p = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(p.delay(64), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn success_ends_immediately() {
        let p = RetryPolicy::default();
        let s = Signal::new("a", 0.3, Utc::now(), None).unwrap();
        assert_eq!(p.advance(1, Ok(s.clone())), FetchState::Succeeded(s));
    }

    #[test]
    fn timeout_retries_until_budget_spent() {
        let p = RetryPolicy::new(3, Duration::ZERO);
        assert_eq!(p.advance(1, Err(SourceError::Timeout)), FetchState::Attempting(2));
        assert_eq!(p.advance(2, Err(SourceError::Timeout)), FetchState::Attempting(3));
        assert_eq!(
            p.advance(3, Err(SourceError::Timeout)),
            FetchState::Exhausted(SourceError::Timeout)
        );
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let p = RetryPolicy::new(5, Duration::ZERO);
        let err = SourceError::Permanent("bad payload".into());
        assert_eq!(p.advance(1, Err(err.clone())), FetchState::Exhausted(err));
    }
}
