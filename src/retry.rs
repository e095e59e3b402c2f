// src/retry.rs
// Bounded retry with exponential backoff and jitter for store calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::logging::log_warning;
use crate::store::StoreError;

/// Upper bound of the random jitter added to each backoff step, in milliseconds.
const JITTER_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// `base * 2^attempt` plus up to JITTER_MS of jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = Duration::from_millis(rand::rng().random_range(0..JITTER_MS));
        exponential.saturating_add(jitter)
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or the attempts run out.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt + 1 >= policy.max_attempts => return Err(e),
            Err(e) => {
                let delay = policy.backoff(attempt);
                log_warning(&format!(
                    "Retry {}/{} after {}ms: {e}",
                    attempt + 1,
                    policy.max_attempts,
                    delay.as_millis()
                ));
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::new(3, Duration::from_millis(300));
        let first = policy.backoff(0);
        let third = policy.backoff(2);
        assert!(first >= Duration::from_millis(300) && first < Duration::from_millis(400));
        assert!(third >= Duration::from_millis(1200) && third < Duration::from_millis(1300));
    }

    #[test]
    fn test_policy_needs_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(fast_policy(3), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable("connection reset".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), StoreError> = with_retry(fast_policy(3), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("timeout".to_string()))
        })
        .await;

        assert_eq!(result, Err(StoreError::Unavailable("timeout".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), StoreError> = with_retry(fast_policy(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::bad_request("malformed"))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Client { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_definitive_answers_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), StoreError> = with_retry(fast_policy(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound(9))
        })
        .await;

        assert_eq!(result, Err(StoreError::NotFound(9)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
