//! Retry decisions for failed probe attempts.

use crate::proxy::models::ProbeOutcome;
use std::time::Duration;

/// Default number of attempts per proxy, the first one included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on any single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// What to do after an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then probe again
    Retry { delay: Duration },
    /// Stop; this outcome is the proxy's final record
    Terminal(ProbeOutcome),
}

/// Bounded exponential backoff.
///
/// `delay = base_delay * 2^attempts_made`, saturating and capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` below 1 is raised to 1: every proxy is probed at least once.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what follows an attempt. `attempts_made` counts the attempt
    /// that produced `outcome`.
    pub fn decide(&self, outcome: ProbeOutcome, attempts_made: u32) -> RetryDecision {
        if outcome.is_success() || attempts_made >= self.max_attempts {
            return RetryDecision::Terminal(outcome);
        }
        RetryDecision::Retry {
            delay: self.backoff(attempts_made),
        }
    }

    /// Backoff before the attempt following `attempts_made`
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts_made).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::FailureKind;

    fn timeout() -> ProbeOutcome {
        ProbeOutcome::failure(FailureKind::Timeout, "timed out")
    }

    #[test]
    fn test_success_is_always_terminal() {
        let policy = RetryPolicy::new(5);
        let outcome = ProbeOutcome::success(None);
        assert_eq!(
            policy.decide(outcome.clone(), 1),
            RetryDecision::Terminal(outcome)
        );
    }

    #[test]
    fn test_failure_retries_until_budget_spent() {
        let policy = RetryPolicy::new(3);
        assert!(matches!(policy.decide(timeout(), 1), RetryDecision::Retry { .. }));
        assert!(matches!(policy.decide(timeout(), 2), RetryDecision::Retry { .. }));
        assert_eq!(policy.decide(timeout(), 3), RetryDecision::Terminal(timeout()));
        assert_eq!(policy.decide(timeout(), 4), RetryDecision::Terminal(timeout()));
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy::new(1);
        assert_eq!(policy.decide(timeout(), 1), RetryDecision::Terminal(timeout()));
    }

    #[test]
    fn test_zero_attempts_raised_to_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }

    #[test]
    fn test_terminal_keeps_last_failure_details() {
        let policy = RetryPolicy::new(1);
        let outcome = ProbeOutcome::failure(FailureKind::NonSuccessStatus(502), "bad gateway");
        match policy.decide(outcome, 1) {
            RetryDecision::Terminal(ProbeOutcome::Failure { kind, message }) => {
                assert_eq!(kind, FailureKind::NonSuccessStatus(502));
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(10)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(60));
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(
            policy.decide(timeout(), 2),
            RetryDecision::Retry {
                delay: Duration::from_millis(400)
            }
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(u32::MAX)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.backoff(3), Duration::from_secs(5));
        assert_eq!(policy.backoff(64), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }
}
