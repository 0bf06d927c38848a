use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::BackendError;

/// Bounded retry with exponential backoff
///
/// `retryable` decides which errors earn another attempt; everything else is
/// returned to the caller straight away.
#[derive(Debug, Clone)]
pub struct RetryPolicy<E> {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Growth factor applied per attempt
    pub multiplier: u32,

    pub retryable: fn(&E) -> bool,
}

impl RetryPolicy<BackendError> {
    /// 3 attempts, 4s then 8s, capped at 10s, rate limits only
    pub fn backend_default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
            retryable: BackendError::is_rate_limited,
        }
    }
}

impl<E> RetryPolicy<E> {
    /// Policy that never sleeps, handy for tests and dry runs
    pub fn immediate(max_attempts: u32, retryable: fn(&E) -> bool) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
            retryable,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, hits a non-retryable error, or runs out of attempts
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy<E>, mut operation: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if (policy.retryable)(&err) && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "Retryable error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if (policy.retryable)(&err) {
                    tracing::error!(attempt, error = %err, "Max retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_backend_default_schedule() {
        let policy = RetryPolicy::backend_default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(4));
        assert_eq!(policy.delay_after(2), Duration::from_secs(8));
        assert_eq!(policy.delay_after(3), Duration::from_secs(10));
        assert_eq!(policy.delay_after(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retries_rate_limit_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3, BackendError::is_rate_limited);

        let result = with_retry(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(BackendError::RateLimited("slow down".into()))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(assert_ok!(result), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3, BackendError::is_rate_limited);

        let result: Result<(), _> = with_retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::RateLimited("slow down".into()))
        })
        .await;

        assert!(assert_err!(result).is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3, BackendError::is_rate_limited);

        let result: Result<(), _> = with_retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Failed("invalid api key".into()))
        })
        .await;

        assert_eq!(
            assert_err!(result),
            BackendError::Failed("invalid api key".into())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(0, BackendError::is_rate_limited);

        let _ = with_retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BackendError>(())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
