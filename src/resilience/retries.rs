//! Retry policy for outbound calls.
//!
//! # Responsibilities
//! - Bound the number of attempts for one logical call
//! - Compute the backoff delay between attempts
//!
//! # Design Decisions
//! - One policy for every call site; the attempt count is configuration
//! - Non-success statuses and transport errors/timeouts are retried
//! - Rate-limit rejections and cancellations are never retried

use std::time::Duration;

use crate::config::OutboundConfig;
use crate::resilience::backoff::calculate_backoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Always at least 1.
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay_ms,
            max_delay_ms: u64::MAX,
            max_jitter_ms: 1000,
        }
    }

    pub fn from_config(config: &OutboundConfig) -> Self {
        Self {
            attempts: config.retries.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            max_jitter_ms: config.max_jitter_ms,
        }
    }

    pub fn with_jitter(mut self, max_jitter_ms: u64) -> Self {
        self.max_jitter_ms = max_jitter_ms;
        self
    }

    pub fn is_final(&self, attempt: u32) -> bool {
        attempt >= self.attempts
    }

    /// Delay to wait after a failed `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms, self.max_jitter_ms)
    }

    /// Longest a logical call can take when every attempt runs into
    /// `attempt_timeout` and every backoff draws the maximum jitter.
    pub fn worst_case(&self, attempt_timeout: Duration) -> Duration {
        let sleeps = (1..self.attempts)
            .map(|attempt| calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms, 0))
            .map(|delay| delay.saturating_add(Duration::from_millis(self.max_jitter_ms)))
            .fold(Duration::ZERO, Duration::saturating_add);
        attempt_timeout.saturating_mul(self.attempts).saturating_add(sleeps)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OutboundConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert!(!policy.is_final(2));
        assert!(policy.is_final(3));

        let zero = RetryPolicy::new(0, 10);
        assert_eq!(zero.attempts, 1);
        assert!(zero.is_final(1));
    }

    #[test]
    fn test_delay_grows() {
        let policy = RetryPolicy::new(3, 50).with_jitter(0);
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
    }

    #[test]
    fn test_worst_case_budget() {
        let policy = RetryPolicy::default();
        // 3 x 30s attempts, then (1s + 1s) and (2s + 1s) of backoff.
        assert_eq!(policy.worst_case(Duration::from_secs(30)), Duration::from_secs(95));

        let single = RetryPolicy::new(1, 500);
        assert_eq!(single.worst_case(Duration::from_millis(250)), Duration::from_millis(250));
    }
}
