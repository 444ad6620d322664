//! Retry policy for failed dispatches.

use std::time::Duration;

use serde::Serialize;

use crate::error::TransportError;

/// What happens to an item after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-admit after the given delay
    RetryAfter(Duration),
    /// Leave the item failed
    GiveUp,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` counts failures so
    /// far (1-based): `min(initial * 2^(attempt-1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Decides the fate of an item that has now failed `attempts` times.
    pub fn decide(&self, attempts: u32, error: &TransportError) -> RetryDecision {
        if !error.is_retryable() || attempts >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.delay(attempts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(9), Duration::from_secs(256));
        assert_eq!(policy.delay(10), Duration::from_secs(300));
        assert_eq!(policy.delay(200), Duration::from_secs(300));
    }

    #[test]
    fn test_rejection_is_terminal_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, &TransportError::Rejected("schema".into())),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_cap_is_terminal() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.decide(4, &TransportError::Timeout),
            RetryDecision::RetryAfter(Duration::from_secs(8))
        );
        assert_eq!(policy.decide(5, &TransportError::Timeout), RetryDecision::GiveUp);
    }
}
