// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Retry policies for step execution.
//!
//! Steps declare a retry budget (`retry` = attempts beyond the first); the
//! runner sleeps between attempts according to the policy. The default step
//! policy is a short fixed delay, but exponential backoff is available for
//! callers that need it.

use rand::Rng;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_attempts: u32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier for exponential backoff (1.0 = fixed delay).
    pub multiplier: f64,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Whether to add jitter to prevent lockstep retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(250),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(0),
            multiplier: 1.0,
            max_delay: Duration::from_millis(0),
            jitter: false,
        }
    }

    /// Creates a retry policy with fixed delays between attempts.
    pub fn fixed_delay(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Creates an exponential backoff policy.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier: 2.0,
            max_delay,
            jitter: true,
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt >= self.max_attempts {
            return Duration::from_millis(0);
        }

        let base_delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let base_delay = Duration::from_millis(base_delay_ms as u64);
        let capped = std::cmp::min(base_delay, self.max_delay);

        if self.jitter {
            add_jitter(capped)
        } else {
            capped
        }
    }

    /// Returns true if retries are enabled.
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

/// Random jitter between 75% and 125% of the delay.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor = rng.gen_range(0.75..=1.25);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry_policy() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.is_enabled());
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(0));
    }

    #[test]
    fn test_fixed_delay_policy() {
        let policy = RetryPolicy::fixed_delay(3, Duration::from_millis(500));
        assert!(policy.is_enabled());
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
        // Past the budget there is nothing to wait for.
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(0));
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let mut policy =
            RetryPolicy::exponential(10, Duration::from_millis(100), Duration::from_secs(1));
        policy.jitter = false;

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(1000), Duration::from_secs(10));
        for _ in 0..10 {
            let delay = policy.delay_for_attempt(0).as_millis();
            assert!((750..=1250).contains(&delay));
        }
    }
}
