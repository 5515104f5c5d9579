//! Retry with backoff for rate-limited external calls.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};

/// Configuration for rate-limit retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl RetryConfig {
    /// The standard schedule for external AI services: three attempts with
    /// exponential backoff starting at 15 seconds.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(15),
            operation_name: operation_name.into(),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt - 1))
    }
}

/// Execute an operation, retrying only on `RateLimited` errors.
///
/// Any other error returns immediately; an exhausted retry budget returns
/// the final `RateLimited` so the HTTP layer can surface a 503.
pub async fn retry_rate_limited<F, Fut, T>(config: &RetryConfig, operation: F) -> PipelineResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() && attempt < config.max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} rate limited (attempt {}/{}), backing off {:?}",
                    config.operation_name, attempt, config.max_attempts, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(name: &str) -> RetryConfig {
        RetryConfig::new(name).with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::new("test");
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(15));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retries_rate_limited_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_rate_limited(&fast("op"), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PipelineError::RateLimited)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: PipelineResult<()> = retry_rate_limited(&fast("op"), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::RateLimited) }
        })
        .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: PipelineResult<()> = retry_rate_limited(&fast("op"), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::input("bad request")) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), PipelineError::Input(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
