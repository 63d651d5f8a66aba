//! Retry decisions for failed task attempts.
//!
//! A failed attempt is classified into a [`FailureType`]. The
//! [`RetryPolicy`] then decides, from the failure type and the number of
//! attempts made so far, whether the task goes back to the queue and how
//! long to wait before it does.
//!
//! # Example
//!
//! ```
//! use grabkit::GrabError;
//! use grabkit::spider::{RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::with_max_attempts(3);
//! let error = GrabError::timeout("ReadTimeoutError", "http://example.com/", None);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use crate::error::GrabError;

/// Default number of network attempts per task.
pub const DEFAULT_NETWORK_TRY_LIMIT: u32 = 5;

/// Default multiplier when backoff is enabled.
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Default cap on a single backoff delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Upper bound of the jitter added to non-zero delays.
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Might succeed on another attempt: timeouts, connection faults,
    /// unexpected HTTP statuses.
    Transient,
    /// Will fail the same way again: misuse, malformed URLs, bad redirects,
    /// local IO faults.
    Permanent,
}

/// Whether a failed attempt is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Queue the task again after `delay`.
    Retry {
        /// Wait before the task is queued again.
        delay: Duration,
        /// Number of the next attempt (the first retry is attempt 2).
        attempt: u32,
    },
    /// Give up on the task.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry limits and backoff.
///
/// No delay is applied unless a base delay is configured with
/// [`with_backoff`](Self::with_backoff).
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_NETWORK_TRY_LIMIT,
            base_delay: Duration::ZERO,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit settings. `max_attempts` is at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy allowing `max_attempts` attempts without backoff.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Enables exponential backoff starting at `base_delay`.
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Maximum attempts, including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after attempt number `attempt` failed.
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }
        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "network try limit reached");
            return RetryDecision::DoNotRetry {
                reason: format!("network try limit ({}) reached", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(attempt, next_attempt = attempt + 1, delay_ms = delay.as_millis(), "will retry");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * f64::from(self.backoff_multiplier).powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter_ms = rand::thread_rng().gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(capped_ms as u64) + Duration::from_millis(jitter_ms)
    }
}

/// Classifies a transport error.
///
/// Only timeouts and connection faults are worth another attempt.
#[must_use]
pub fn classify_error(error: &GrabError) -> FailureType {
    if error.is_retryable() {
        FailureType::Transient
    } else {
        FailureType::Permanent
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::error_mapping::names;

    #[test]
    fn test_default_policy_has_no_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), DEFAULT_NETWORK_TRY_LIMIT);
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::ZERO,
                attempt: 2
            }
        );
    }

    #[test]
    fn test_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
    }

    #[test]
    fn test_limit_of_one_never_retries() {
        let policy = RetryPolicy::with_max_attempts(1);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let policy = RetryPolicy::with_max_attempts(10);
        let RetryDecision::DoNotRetry { reason } = policy.should_retry(FailureType::Permanent, 1)
        else {
            panic!("permanent failures must not be retried");
        };
        assert!(reason.contains("permanent"));
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = RetryPolicy::with_max_attempts(10)
            .with_backoff(Duration::from_millis(100), Duration::from_millis(300));
        let first = policy.calculate_delay(1);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(100) + MAX_JITTER);

        let capped = policy.calculate_delay(6);
        assert!(capped >= Duration::from_millis(300));
        assert!(capped <= Duration::from_millis(300) + MAX_JITTER);
    }

    #[test]
    fn test_classify_error_follows_taxonomy() {
        let timeout = GrabError::timeout(names::READ_TIMEOUT, "http://a/", None);
        let connection = GrabError::connection(names::NEW_CONNECTION, "http://a/", None);
        let invalid_url = GrabError::invalid_url("http://", "empty host");
        let misuse = GrabError::misuse("bad option");
        let bad_redirect = GrabError::invalid_response(names::LOCATION_PARSE, "bad", None);

        assert_eq!(classify_error(&timeout), FailureType::Transient);
        assert_eq!(classify_error(&connection), FailureType::Transient);
        assert_eq!(classify_error(&invalid_url), FailureType::Permanent);
        assert_eq!(classify_error(&misuse), FailureType::Permanent);
        assert_eq!(classify_error(&bad_redirect), FailureType::Permanent);
    }
}
