//! Retry and backoff policy.
//!
//! A failed attempt is first classified by its [`FailureKind`]; the policy then
//! makes the single retry-or-terminate decision and computes the backoff.

use std::time::Duration;

use rand::Rng;

use crate::FailureKind;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after a backoff delay.
    Retry,
    /// The failure is fatal (or a cancellation); stop with it as is.
    Stop,
    /// The failure was transient but no attempts are left.
    Exhausted,
}

/// Exponential backoff with additive jitter: `base^attempt` seconds plus a
/// uniform `0..=max_jitter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a session makes at most `max_retries + 1` attempts.
    pub max_retries: u32,
    pub backoff_base: u32,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2,
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decide what to do after attempt `attempt` (0-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if !kind.is_transient() {
            return RetryDecision::Stop;
        }
        if attempt >= self.max_retries {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        // Exponent is capped so a misconfigured policy cannot overflow.
        let secs = u64::from(self.backoff_base).saturating_pow(attempt.min(16));
        let jitter_ms = self.max_jitter.as_millis().min(u128::from(u64::MAX)) as u64;
        let jitter = Duration::from_millis(rng.gen_range(0..=jitter_ms));
        Duration::from_secs(secs).saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn fatal_kinds_stop_immediately() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(0, FailureKind::HttpError(404)), RetryDecision::Stop);
        assert_eq!(p.decide(0, FailureKind::Io), RetryDecision::Stop);
        assert_eq!(p.decide(0, FailureKind::Cancelled), RetryDecision::Stop);
    }

    #[test]
    fn transient_kinds_retry_until_budget_is_spent() {
        let p = RetryPolicy::default();
        for attempt in 0..3 {
            assert_eq!(p.decide(attempt, FailureKind::Timeout), RetryDecision::Retry);
            assert_eq!(p.decide(attempt, FailureKind::RateLimited), RetryDecision::Retry);
        }
        assert_eq!(p.decide(3, FailureKind::ConnectionFailed), RetryDecision::Exhausted);
        assert_eq!(p.max_attempts(), 4);
    }

    #[test]
    fn zero_retries_exhausts_on_first_failure() {
        let p = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.decide(0, FailureKind::DecodeError), RetryDecision::Exhausted);
    }

    #[test]
    fn backoff_is_exponential_plus_bounded_jitter() {
        let p = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(1);
        for attempt in 1..=3 {
            let delay = p.backoff(attempt, &mut rng);
            let floor = Duration::from_secs(2u64.pow(attempt));
            assert!(delay >= floor);
            assert!(delay <= floor + p.max_jitter);
        }
    }

    #[test]
    fn backoff_without_jitter_is_exact() {
        let p = RetryPolicy {
            max_jitter: Duration::ZERO,
            backoff_base: 3,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(p.backoff(2, &mut rng), Duration::from_secs(9));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let p = RetryPolicy {
            backoff_base: u32::MAX,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let _ = p.backoff(u32::MAX, &mut rng);
    }
}
