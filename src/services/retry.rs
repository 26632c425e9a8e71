//! Retry Logic with Exponential Backoff
//!
//! Re-runs an API attempt while the failure is classified as retryable.
//! Rate-limited attempts wait twice as long as ordinary ones.

use super::api_errors::{ApiErrorKind, ApiFailure};
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts after the first one
    pub max_retries: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// `base_delay * 2^attempt`, scaled by the error's backoff factor and capped
    pub fn delay_for(&self, attempt: u32, kind: ApiErrorKind) -> Duration {
        let exponential = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(exponential)
            .saturating_mul(kind.backoff_factor())
            .min(self.max_delay)
    }
}

/// Execute an async attempt with retry logic.
///
/// The closure receives the zero-based attempt index and must build a fresh
/// request each time. Non-retryable failures are returned as-is; a retryable
/// failure on the last attempt is returned as `NetworkExhausted`.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, ApiFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiFailure>>,
{
    let mut attempt = 0;

    loop {
        match f(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }

                if attempt >= config.max_retries {
                    warn!(
                        "[Retry] {} failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        err
                    );
                    return Err(err.exhausted());
                }

                let delay = config.delay_for(attempt, err.kind);
                debug!(
                    "[Retry] {} attempt {}/{} failed ({}), retrying in {:?}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    err,
                    delay
                );

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
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let config = RetryConfig::default();
        let result = with_retry(&config, "test", |_| async { Ok::<_, ApiFailure>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(), "test", |_| {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(ApiFailure::new(ApiErrorKind::NetworkError, "connection refused"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_fails_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(), "test", |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ApiFailure::from_response(401, "unauthorized")) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::AuthFailure);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(), "test", |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ApiFailure::from_response(500, "boom")) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::NetworkExhausted);
        assert!(err.message.contains("boom"));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_delay_doubles_and_rate_limit_waits_longer() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(config.delay_for(0, ApiErrorKind::ServerError), Duration::from_millis(100));
        assert_eq!(config.delay_for(1, ApiErrorKind::NetworkError), Duration::from_millis(200));
        assert_eq!(config.delay_for(2, ApiErrorKind::ServerError), Duration::from_millis(400));
        assert_eq!(config.delay_for(1, ApiErrorKind::RateLimited), Duration::from_millis(400));
        assert_eq!(config.delay_for(4, ApiErrorKind::ServerError), Duration::from_secs(1));
    }
}
