use std::time::Duration;

use taskops_core::RetryConfig;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then run again.
    RetryAfter(Duration),
    /// The trigger's attempt budget is spent.
    GiveUp,
}

/// Fixed-delay retry policy.
///
/// `attempts_used` counts executions already made in the current trigger,
/// including the first one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn decide(config: &RetryConfig, attempts_used: u32) -> RetryDecision {
        if attempts_used < config.max_attempts {
            RetryDecision::RetryAfter(config.delay)
        } else {
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_attempts_means_two_retries() {
        let cfg = RetryConfig {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        };
        assert_eq!(
            RetryPolicy::decide(&cfg, 1),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            RetryPolicy::decide(&cfg, 2),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(RetryPolicy::decide(&cfg, 3), RetryDecision::GiveUp);
        assert_eq!(RetryPolicy::decide(&cfg, 4), RetryDecision::GiveUp);
    }

    #[test]
    fn single_attempt_never_retries() {
        let cfg = RetryConfig {
            max_attempts: 1,
            delay: Duration::from_secs(60),
        };
        assert_eq!(RetryPolicy::decide(&cfg, 1), RetryDecision::GiveUp);
    }
}
