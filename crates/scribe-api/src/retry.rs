//! Backoff policy for transient API failures.

use rand::Rng;
use scribe_types::ApiError;
use std::time::Duration;

/// How often and how long to wait before re-sending a failed request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether `error` after `attempt` (0-based) should be retried.
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        attempt < self.max_retries && is_transient(error)
    }

    /// Wait before the retry following `attempt`.
    ///
    /// A server-provided hint wins, capped at `max_delay`. Otherwise the base
    /// delay doubles per attempt with ±25% jitter.
    pub fn backoff(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(self.max_delay);
        }
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.max_delay);
        let jitter = rand::rng().random_range(0.75..=1.25);
        capped.mul_f64(jitter).min(self.max_delay)
    }
}

/// Rate limits, overload, 5xx, network failures and timeouts are transient.
fn is_transient(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::RateLimited { .. }
            | ApiError::Overloaded
            | ApiError::Server { .. }
            | ApiError::Network(_)
            | ApiError::Timeout
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_retry_until_budget_spent() {
        let policy = RetryPolicy::default();
        let err = ApiError::Overloaded;
        assert!(policy.should_retry(&err, 0));
        assert!(policy.should_retry(&err, 1));
        assert!(!policy.should_retry(&err, 2));
    }

    #[test]
    fn client_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        for err in [
            ApiError::Auth {
                message: "bad key".into(),
            },
            ApiError::BadRequest {
                message: "bad input".into(),
            },
            ApiError::Decode("eof".into()),
        ] {
            assert!(!policy.should_retry(&err, 0), "{err}");
        }
    }

    #[test]
    fn none_policy_never_retries() {
        assert!(!RetryPolicy::none().should_retry(&ApiError::Timeout, 0));
    }

    #[test]
    fn backoff_grows_with_jitter() {
        let policy = RetryPolicy::default();
        let d0 = policy.backoff(0, None).as_millis();
        let d2 = policy.backoff(2, None).as_millis();
        assert!((750..=1250).contains(&d0), "d0={d0}");
        assert!((3000..=5000).contains(&d2), "d2={d2}");
    }

    #[test]
    fn server_hint_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        assert_eq!(
            policy.backoff(0, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.backoff(0, Some(Duration::from_secs(30))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn backoff_never_exceeds_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert!(policy.backoff(8, None) <= Duration::from_secs(5));
    }
}
