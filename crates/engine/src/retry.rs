//! Retry policy for idempotent reads.

use crate::config::RetryConfig;
use crate::error::{ApiError, ApiResult};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_retries: c.max_retries,
            base_delay: Duration::from_millis(c.base_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `min(base * 2^attempt, max)` for the zero-based retry number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32, err: &ApiError) -> bool {
        attempt < self.max_retries && !err.is_client_error() && err.is_retryable()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if self.should_retry(attempt, &e) => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        request = what,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying read"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
        };
        assert_eq!(p.delay_for(0), Duration::from_millis(1000));
        assert_eq!(p.delay_for(1), Duration::from_millis(2000));
        assert_eq!(p.delay_for(2), Duration::from_millis(3000));
        assert_eq!(p.delay_for(40), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_server_errors_twice() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ApiResult<()> = RetryPolicy::default()
            .run("GET /x", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::from_status(503, ""))
            })
            .await;
        assert!(matches!(result, Err(ApiError::Server { status: 503, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_on_4xx() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ApiResult<()> = RetryPolicy::default()
            .run("GET /x", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::from_status(404, ""))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_network_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = RetryPolicy::default()
            .run("GET /x", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiError::Network("reset".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
