use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Classification of errors for retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableError {
    /// 429 Rate Limit - waits twice the scheduled backoff
    RateLimit,
    /// 5xx Server Error
    ServerError,
    /// Network timeout or dropped connection
    Timeout,
    /// Everything else - never retried
    Other,
}

/// Exponential backoff: attempt `n` (0-indexed) waits `base_delay * 2^n`, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including initial attempt)
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            ..Self::default()
        }
    }

    /// No retries at all; the first failure is returned as-is
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry `attempt`, or `None` when the error is not retryable
    pub fn delay_for(&self, attempt: u32, error_type: RetryableError) -> Option<Duration> {
        let factor = match error_type {
            RetryableError::RateLimit => 2u32,
            RetryableError::ServerError | RetryableError::Timeout => 1,
            RetryableError::Other => return None,
        };

        let exponential = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(exponential.saturating_mul(factor))
            .unwrap_or(self.max_delay);

        Some(delay.min(self.max_delay))
    }
}

/// Retry an async operation with exponential backoff
///
/// # Arguments
/// * `operation` - Produces a fresh future for every attempt
/// * `policy` - Retry budget and delays
/// * `classify_error` - Decides whether and how an error is retried
///
/// # Example
/// ```ignore
/// let result = retry_with_backoff(
///     || async { client.call().await },
///     &RetryPolicy::default(),
///     |e| if e.is_rate_limit() { RetryableError::RateLimit } else { RetryableError::Other },
/// ).await;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    policy: &RetryPolicy,
    classify_error: impl Fn(&E) -> RetryableError,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("✅ Operation succeeded after {} retry attempts", attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                let error_type = classify_error(&e);

                let delay = match policy.delay_for(attempt, error_type) {
                    Some(delay) if attempt < policy.max_retries => delay,
                    Some(_) => {
                        error!(
                            "❌ Operation failed after {} attempts (max retries exhausted): {}",
                            attempt + 1,
                            e
                        );
                        return Err(e);
                    }
                    None => {
                        debug!("Operation failed with non-retryable error: {}", e);
                        return Err(e);
                    }
                };

                warn!(
                    "⚠️  Operation failed (attempt {}/{}): {} - Retrying in {}ms ({:?})",
                    attempt + 1,
                    policy.max_retries + 1,
                    e,
                    delay.as_millis(),
                    error_type
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(&'static str);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0, RetryableError::ServerError), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(1, RetryableError::Timeout), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(1, RetryableError::RateLimit), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(4, RetryableError::ServerError), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(40, RetryableError::RateLimit), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(0, RetryableError::Other), None);
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let result = retry_with_backoff(
            || async { Ok::<_, TestError>(42) },
            &RetryPolicy::default(),
            |_| RetryableError::Other,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError("fatal"))
            },
            &fast_policy(3),
            |_| RetryableError::Other,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(TestError("rate_limit"))
                } else {
                    Ok(42)
                }
            },
            &fast_policy(3),
            |_| RetryableError::RateLimit,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError("server"))
            },
            &fast_policy(2),
            |_| RetryableError::ServerError,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }

    #[tokio::test]
    async fn test_none_policy_single_attempt() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError("timeout"))
            },
            &RetryPolicy::none(),
            |_| RetryableError::Timeout,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
