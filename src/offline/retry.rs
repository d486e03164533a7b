//! # Retry Policy and Backoff Strategies
//!
//! Pure decision logic for remote failures: given the attempt number, the error
//! and the operation kind, decide whether to try again and after how long.
//!
//! ## Features
//!
//! - **Exponential Backoff**: Gradually increase retry intervals
//! - **Jitter**: Add randomness to prevent thundering herd
//! - **Max Attempts**: Bounded budget, counting the first attempt
//! - **Error Classes**: Only network errors, 5xx and 429 are retried
//!
//! ## Usage
//!
//! ```rust
//! use xfchat::offline::operation::OperationKind;
//! use xfchat::offline::retry::{DefaultRetryPolicy, RetryPolicy};
//! use xfchat::shared::{ChatError, RetryConfig};
//!
//! let policy = DefaultRetryPolicy::from_config(&RetryConfig::default());
//! let decision = policy.decide(1, &ChatError::network("reset"), OperationKind::SendMessage);
//! assert!(decision.should_retry);
//!
//! let decision = policy.decide(1, &ChatError::auth("expired"), OperationKind::SendMessage);
//! assert!(!decision.should_retry);
//! ```

use crate::offline::operation::OperationKind;
use crate::shared::config::RetryConfig;
use crate::shared::error::ChatError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// Delay before the next attempt; zero when giving up
    pub delay: Duration,
}

impl RetryDecision {
    pub fn retry_after(delay: Duration) -> Self {
        Self {
            should_retry: true,
            delay,
        }
    }

    pub fn give_up() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// Decides whether a failed remote attempt is tried again
///
/// `attempt` is 1-based: the first remote call is attempt 1.
pub trait RetryPolicy: Send + Sync {
    fn decide(&self, attempt: u32, error: &ChatError, kind: OperationKind) -> RetryDecision;
}

/// Backoff strategy configuration
#[derive(Clone)]
pub enum BackoffStrategy {
    /// Fixed interval between retries
    Fixed {
        /// Interval between attempts
        interval: Duration,
    },
    /// Exponential backoff with jitter
    Exponential {
        /// Delay after the first failure
        base: Duration,
        /// Upper bound for any single delay
        max_delay: Duration,
        /// Jitter factor (0.0 to 1.0)
        jitter: f64,
    },
    /// Custom backoff function of the attempt number
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl BackoffStrategy {
    /// Delay to wait after failed attempt number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { interval } => *interval,
            BackoffStrategy::Exponential {
                base,
                max_delay,
                jitter,
            } => {
                let base_ms = base.as_millis() as u64;
                let max_ms = max_delay.as_millis() as u64;
                let factor = 2u64
                    .checked_pow(attempt.saturating_sub(1))
                    .unwrap_or(u64::MAX);
                let delay = base_ms.saturating_mul(factor).min(max_ms);

                let jitter_amount = (delay as f64 * jitter.clamp(0.0, 1.0)) as u64;
                let jittered = if jitter_amount == 0 {
                    delay
                } else {
                    delay + rand::random::<u64>() % (jitter_amount + 1)
                };
                Duration::from_millis(jittered.min(max_ms))
            }
            BackoffStrategy::Custom(calc_fn) => calc_fn(attempt),
        }
    }
}

impl fmt::Debug for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Fixed { interval } => {
                f.debug_struct("Fixed").field("interval", interval).finish()
            }
            BackoffStrategy::Exponential {
                base,
                max_delay,
                jitter,
            } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max_delay", max_delay)
                .field("jitter", jitter)
                .finish(),
            BackoffStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Retries transient failures up to a fixed attempt budget
#[derive(Debug, Clone)]
pub struct DefaultRetryPolicy {
    max_attempts: u32,
    backoff: BackoffStrategy,
}

impl DefaultRetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Exponential backoff from the configured retry settings
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            BackoffStrategy::Exponential {
                base: Duration::from_millis(config.base_delay_ms),
                max_delay: Duration::from_millis(config.max_delay_ms),
                jitter: config.jitter,
            },
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Set backoff strategy
    pub fn set_backoff_strategy(&mut self, strategy: BackoffStrategy) {
        self.backoff = strategy;
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn decide(&self, attempt: u32, error: &ChatError, kind: OperationKind) -> RetryDecision {
        // typing events are never retried
        if kind.is_fire_and_forget() {
            return RetryDecision::give_up();
        }
        if !error.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::give_up();
        }
        RetryDecision::retry_after(self.backoff.delay_for(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> DefaultRetryPolicy {
        DefaultRetryPolicy::new(
            max_attempts,
            BackoffStrategy::Exponential {
                base: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                jitter: 0.0,
            },
        )
    }

    #[test]
    fn test_network_errors_retry_until_budget() {
        let policy = policy(3);
        let error = ChatError::network("timeout");
        assert!(policy.decide(1, &error, OperationKind::SendMessage).should_retry);
        assert!(policy.decide(2, &error, OperationKind::SendMessage).should_retry);
        assert!(!policy.decide(3, &error, OperationKind::SendMessage).should_retry);
    }

    #[test]
    fn test_server_error_classes() {
        let policy = policy(5);
        let kind = OperationKind::SendReaction;
        assert!(policy.decide(1, &ChatError::server(503, "busy"), kind).should_retry);
        assert!(policy.decide(1, &ChatError::server(429, "slow down"), kind).should_retry);
        assert!(!policy.decide(1, &ChatError::server(400, "bad"), kind).should_retry);
        assert!(!policy.decide(1, &ChatError::server(404, "gone"), kind).should_retry);
    }

    #[test]
    fn test_permanent_errors_never_retry() {
        let policy = policy(5);
        let kind = OperationKind::EditMessage;
        for error in [
            ChatError::validation("text", "empty"),
            ChatError::auth("expired"),
            ChatError::not_found("message", "m1"),
            ChatError::Cancelled,
            ChatError::store("unversioned"),
        ] {
            assert_eq!(policy.decide(1, &error, kind), RetryDecision::give_up());
        }
    }

    #[test]
    fn test_typing_is_never_retried() {
        let policy = policy(5);
        let error = ChatError::network("offline");
        assert!(!policy.decide(1, &error, OperationKind::Keystroke).should_retry);
        assert!(!policy.decide(1, &error, OperationKind::StopTyping).should_retry);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = policy(10);
        let error = ChatError::network("reset");
        let delays: Vec<Duration> = (1..=6)
            .map(|attempt| policy.decide(attempt, &error, OperationKind::MarkRead).delay)
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ]
        );
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let strategy = BackoffStrategy::Exponential {
            base: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
        };
        for _ in 0..50 {
            let delay = strategy.delay_for(1);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = policy(u32::MAX);
        let decision = policy.decide(200, &ChatError::network("x"), OperationKind::SendMessage);
        assert_eq!(decision.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_custom_and_fixed_strategies() {
        let custom = BackoffStrategy::Custom(Arc::new(|attempt| Duration::from_secs(attempt as u64)));
        assert_eq!(custom.delay_for(3), Duration::from_secs(3));

        let mut policy = policy(3);
        policy.set_backoff_strategy(BackoffStrategy::Fixed {
            interval: Duration::from_millis(250),
        });
        let decision = policy.decide(2, &ChatError::network("x"), OperationKind::DeleteMessage);
        assert_eq!(decision, RetryDecision::retry_after(Duration::from_millis(250)));
    }
}
