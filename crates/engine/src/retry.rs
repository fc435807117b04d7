//! Bounded retry at the lifecycle boundary.
//!
//! Only storage-level failures are retried: transient backend errors and
//! optimistic-concurrency conflicts. A conflict re-runs the whole unit of
//! work, which re-reads the current state and re-validates against it.
//! Rule violations are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::{from_storage, AttemptError, LifecycleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1` (attempts count from 1): doubling
    /// from the base, capped, plus up to 50% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << (attempt - 1).min(16))
            .min(self.max_delay);
        let jitter_ms = exp.as_millis() as u64 / 2;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }

    /// Run `unit` until it succeeds, is rejected, or attempts run out.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut unit: F,
    ) -> Result<T, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 1;
        loop {
            let err = match unit().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Rejected(err)) => {
                    tracing::debug!(operation, error = %err, "rejected");
                    return Err(err);
                }
                Err(AttemptError::Storage(err)) => err,
            };
            let retryable = err.is_transient() || err.is_conflict();
            if !retryable || attempt >= self.max_attempts {
                if err.is_transient() {
                    tracing::warn!(operation, attempts = attempt, error = %err, "retries exhausted");
                }
                return Err(from_storage(operation, err));
            }
            let delay = self.backoff(attempt);
            tracing::debug!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use ticketflow_storage::StorageError;

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
        })
    }

    #[test]
    fn backoff_is_capped() {
        let p = policy(10);
        for attempt in 1..10 {
            // cap plus at most half the cap in jitter
            assert!(p.backoff(attempt) <= Duration::from_millis(6));
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AttemptError::Storage(StorageError::Unavailable("down".into())))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(2)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::Storage(StorageError::Unavailable("down".into())))
            })
            .await;
        assert_eq!(result, Err(LifecycleError::Internal { operation: "test" }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_conflicts_are_contention_not_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(2)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::Storage(StorageError::ConcurrentConflict {
                    kind: "ticket",
                    id: "t".into(),
                    expected_version: 0,
                }))
            })
            .await;
        assert_eq!(result, Err(LifecycleError::Contended { operation: "test" }));
        assert!(!result.unwrap_err().is_rejection());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejections_are_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::Rejected(LifecycleError::invalid_request("no")))
            })
            .await;
        assert!(matches!(result, Err(LifecycleError::InvalidRequest { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_storage_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::Storage(StorageError::Backend("disk".into())))
            })
            .await;
        assert!(matches!(result, Err(LifecycleError::Internal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
