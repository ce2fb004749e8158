//! Exponential backoff retry policy for failed deliveries.
//!
//! The policy is a pure value type: attempt count in, delay out. It also
//! owns the two lifecycle predicates the worker consults (retry budget and
//! DLQ threshold).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry behavior configuration for failed message deliveries.
///
/// The schedule follows `delay = min(base_delay * exponential_base^attempt,
/// max_delay)`. With the defaults (30s base, 2.0 exponent, 30m cap):
///
/// ```text
/// Attempt 1: 1m
/// Attempt 2: 2m
/// Attempt 3: 4m
/// Attempt 4: 8m
/// Attempt 5: 16m   (DLQ threshold)
/// Attempt 6+: 30m
/// ```
///
/// Note the overlap between the two limits: with `dlq_threshold` below
/// `max_attempts` (the default), the DLQ transition fires first and the
/// attempt ceiling is never reached. Both knobs are kept so either bound can
/// govern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum delivery attempts before an item stops being eligible.
    pub max_attempts: u32,

    /// Initial retry delay.
    pub base_delay: Duration,

    /// Retry delay ceiling.
    pub max_delay: Duration,

    /// Backoff multiplier (e.g. 2.0 for doubling).
    pub exponential_base: f64,

    /// Move an item to the dead letter queue once it has failed this many
    /// times.
    pub dlq_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30 * 60),
            exponential_base: 2.0,
            dlq_threshold: 5,
        }
    }
}

impl RetryPolicy {
    /// Calculates the retry delay for the given attempt number.
    ///
    /// Attempt 0 (and anything before a first failure) gets the base delay.
    /// The exponential never overflows: the result is clamped to
    /// `max_delay` before conversion.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base_delay;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);

        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::from_secs_f64(delay)
    }

    /// Returns true once an item's failure count warrants the DLQ.
    pub fn should_dlq(&self, attempt_count: u32) -> bool {
        attempt_count >= self.dlq_threshold
    }

    /// Returns true while another retry attempt is allowed.
    pub fn is_retryable(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Renders the retry schedule for operators and logs.
    ///
    /// Lists every attempt up to `max_attempts` and marks the DLQ boundary.
    pub fn describe_schedule(&self) -> String {
        let mut schedule = String::from("Retry Schedule:\n");
        for attempt in 1..=self.max_attempts {
            let delay = self.delay_for(attempt);
            schedule.push_str(&format!("  Attempt {attempt}: after {}\n", format_delay(delay)));
            if attempt == self.dlq_threshold {
                schedule.push_str("  -> Move to DLQ\n");
            }
        }
        schedule
    }
}

fn format_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_fixed_vectors() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for(4), Duration::from_secs(480));
        assert_eq!(policy.delay_for(5), Duration::from_secs(960));
    }

    #[test]
    fn delay_caps_at_max_from_attempt_six() {
        let policy = RetryPolicy::default();

        for attempt in 6..=20 {
            assert_eq!(policy.delay_for(attempt), Duration::from_secs(1800));
        }
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
        assert_eq!(policy.delay_for(10_000), policy.max_delay);
    }

    #[test]
    fn dlq_threshold_is_inclusive() {
        let policy = RetryPolicy::default();

        assert!(!policy.should_dlq(4));
        assert!(policy.should_dlq(5));
        assert!(policy.should_dlq(6));
    }

    #[test]
    fn retry_budget_is_exclusive() {
        let policy = RetryPolicy::default();

        assert!(policy.is_retryable(0));
        assert!(policy.is_retryable(9));
        assert!(!policy.is_retryable(10));
        assert!(!policy.is_retryable(11));
    }

    #[test]
    fn schedule_description_lists_attempts_and_dlq_boundary() {
        let policy = RetryPolicy::default();
        let schedule = policy.describe_schedule();

        assert!(schedule.contains("Attempt 1: after 1m"));
        assert!(schedule.contains("Attempt 5: after 16m"));
        assert!(schedule.contains("Attempt 10: after 30m"));

        let dlq_marker = schedule.find("-> Move to DLQ").expect("DLQ marker missing");
        let attempt_five = schedule.find("Attempt 5").expect("attempt 5 missing");
        let attempt_six = schedule.find("Attempt 6").expect("attempt 6 missing");
        assert!(attempt_five < dlq_marker && dlq_marker < attempt_six);
    }

    #[test]
    fn custom_policy_respects_its_own_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 3.0,
            dlq_threshold: 3,
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for(2), Duration::from_secs(9));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
    }
}
