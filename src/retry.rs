/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Retry policies for failed task attempts.
//!
//! A [`RetryPolicy`] decides whether a failed attempt should be re-run and
//! how long to wait before doing so. Operation errors are contained entirely
//! within the policy: they never surface past the task boundary until the
//! attempt budget is exhausted, at which point the task's final outcome is
//! failure.
//!
//! The inter-attempt delay is a scheduled re-submission, not a busy wait;
//! the runner races it against the run's abort signal so that a pending
//! retry can always be cancelled.

use std::time::Duration;

/// Strategy for scaling the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Every retry waits the same `initial_delay`.
    Fixed,
    /// Delay grows as `initial_delay * base^(attempt - 1)`.
    Exponential { base: f64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential { base: 2.0 }
    }
}

/// Governs how a failed task attempt is re-attempted before the task is
/// declared permanently failed.
///
/// `max_attempts` is an upper bound on total attempts, so a policy with
/// `max_attempts = 1` never retries. Delays are scaled by the backoff
/// strategy, capped at `max_delay`, and optionally jittered by ±10% to keep
/// concurrent retries from synchronizing.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use aqueduct::{BackoffStrategy, RetryPolicy};
///
/// let policy = RetryPolicy::builder()
///     .max_attempts(3)
///     .initial_delay(Duration::from_millis(500))
///     .backoff(BackoffStrategy::Exponential { base: 2.0 })
///     .build();
///
/// assert!(policy.should_retry(1));
/// assert!(policy.should_retry(2));
/// assert!(!policy.should_retry(3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound on total attempts, at least 1.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on any computed delay.
    pub max_delay: Duration,
    /// How the delay scales across attempts.
    pub backoff: BackoffStrategy,
    /// Apply ±10% random jitter to computed delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// A single attempt: no retries unless the operator asks for them.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff: BackoffStrategy::default(),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a builder with the default policy as its starting point.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Whether the attempt that just failed leaves budget for another try.
    ///
    /// `attempt` is the 1-based number of the attempt that failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after the given failed attempt before the next one.
    ///
    /// The raw delay is scaled by the backoff strategy and capped at
    /// `max_delay`; jitter, when enabled, perturbs the result by ±10%.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = match self.backoff {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Exponential { base } => {
                let factor = base.powi(attempt.saturating_sub(1) as i32);
                self.initial_delay.mul_f64(factor.max(0.0))
            }
        };

        let capped = scaled.min(self.max_delay);

        if self.jitter {
            use rand::Rng;
            let factor: f64 = rand::thread_rng().gen_range(0.9..=1.1);
            capped.mul_f64(factor)
        } else {
            capped
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Upper bound on total attempts. Values below 1 are clamped to 1.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts.max(1);
        self
    }

    /// Wait before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Ceiling on any computed delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Backoff strategy for scaling delays.
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.policy.backoff = backoff;
        self
    }

    /// Enable or disable ±10% delay jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.policy.jitter = jitter;
        self
    }

    /// Finish building the policy.
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn should_retry_respects_budget() {
        let policy = RetryPolicy::builder().max_attempts(3).build();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn max_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::builder().max_attempts(0).build();
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn fixed_backoff_uses_constant_delay() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .initial_delay(Duration::from_secs(2))
            .backoff(BackoffStrategy::Fixed)
            .build();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(2));
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .backoff(BackoffStrategy::Exponential { base: 2.0 })
            .build();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy::builder()
            .max_attempts(10)
            .initial_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(30))
            .backoff(BackoffStrategy::Exponential { base: 2.0 })
            .build();

        assert_eq!(policy.delay_for_attempt(8), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::builder()
            .max_attempts(2)
            .initial_delay(Duration::from_secs(10))
            .backoff(BackoffStrategy::Fixed)
            .jitter(true)
            .build();

        for _ in 0..100 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_secs(9));
            assert!(delay <= Duration::from_secs(11));
        }
    }
}
