//! Retry backoff and circuit breaking.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::{BreakerConfig, RetryConfig};

/// Exponential backoff with optional ±50% jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Delay before the given attempt (1-based):
    /// `initial · base^(attempt−1)`, capped at `max_delay`, jittered ±50%.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let exponent = (attempt - 1) as i32;
        let raw = self.config.initial_delay_ms as f64 * self.config.exponential_base.powi(exponent);
        let capped = raw.min(self.config.max_delay_ms as f64);

        let final_ms = if self.config.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(final_ms.max(0.0) as u64)
    }
}

/// Circuit-breaker state. One breaker per site (scheduler) plus one for the
/// LLM classifier (pipeline); no cross-site sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    /// Recovery timeout elapsed; exactly one probe is allowed through
    HalfOpen,
}

/// After `failure_threshold` consecutive failures the circuit opens for
/// `recovery_timeout`; a single probe then decides whether to close again.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    consecutive_failures: u32,
    state: BreakerState,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, consecutive_failures: 0, state: BreakerState::Closed, opened_at: None }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether a request may proceed at `now`. Transitions Open → HalfOpen
    /// once the recovery timeout has elapsed; the HalfOpen probe is handed
    /// out exactly once until it resolves.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let elapsed_enough = self
                    .opened_at
                    .map(|at| {
                        now - at
                            >= chrono::Duration::seconds(self.config.recovery_timeout_seconds as i64)
                    })
                    .unwrap_or(true);
                if elapsed_enough {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        match self.state {
            // Failed probe re-opens immediately
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
            }
            BreakerState::Closed => {
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                }
            }
            BreakerState::Open => {
                self.opened_at = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig { failure_threshold: 3, recovery_timeout_seconds: 60 })
    }

    #[test]
    fn backoff_grows_exponentially_without_jitter() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
            jitter: false,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 10,
            initial_delay_ms: 1_000,
            max_delay_ms: 4_000,
            exponential_base: 2.0,
            jitter: false,
        });
        assert_eq!(policy.delay_for(9), Duration::from_millis(4_000));
    }

    #[test]
    fn jitter_stays_within_half_delay() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
        });
        for _ in 0..100 {
            let delay = policy.delay_for(1).as_millis();
            assert!((500..=1_500).contains(&delay), "jittered delay out of range: {delay}");
        }
    }

    #[test]
    fn breaker_opens_after_threshold() {
        let mut breaker = breaker();
        breaker.record_failure(at(0));
        breaker.record_failure(at(1));
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure(at(2));
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire(at(3)));
    }

    #[test]
    fn breaker_allows_single_probe_after_recovery() {
        let mut breaker = breaker();
        for i in 0..3 {
            breaker.record_failure(at(i));
        }
        assert!(!breaker.try_acquire(at(30)));
        assert!(breaker.try_acquire(at(62)));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // No second probe while the first is outstanding
        assert!(!breaker.try_acquire(at(63)));
    }

    #[test]
    fn successful_probe_closes_breaker() {
        let mut breaker = breaker();
        for i in 0..3 {
            breaker.record_failure(at(i));
        }
        assert!(breaker.try_acquire(at(62)));
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire(at(63)));
    }

    #[test]
    fn failed_probe_reopens_breaker() {
        let mut breaker = breaker();
        for i in 0..3 {
            breaker.record_failure(at(i));
        }
        assert!(breaker.try_acquire(at(62)));
        breaker.record_failure(at(63));
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire(at(90)));
        assert!(breaker.try_acquire(at(125)));
    }
}
