//! Bounded retry for transient storage failures.

use std::future::Future;
use std::time::Duration;
use tracing::debug;
use tracline_config::MonitorConfig;
use tracline_core::StorageResult;

/// Attempt budget and base delay. Delay doubles after each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX))
    }
}

impl From<&MonitorConfig> for RetryPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent. The last error is returned.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                debug!(operation, attempt, ?delay, error = %err, "Retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracline_core::StorageError;

    #[test]
    fn delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        assert_eq!(policy.delay(1), Duration::from_millis(50));
        assert_eq!(policy.delay(2), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(RetryPolicy::new(3, Duration::from_millis(10)), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StorageError::Busy("locked".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> =
            with_retry(RetryPolicy::new(2, Duration::from_millis(10)), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StorageError::Io("disk".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> =
            with_retry(RetryPolicy::new(5, Duration::from_millis(10)), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StorageError::Constraint("bad".into())) }
            })
            .await;
        assert!(matches!(result, Err(StorageError::Constraint(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
