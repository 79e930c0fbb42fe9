//! Bounded exponential-backoff retry for opaque async operations.

use std::future::Future;

use hrops_core::RetryPolicy;

/// Error returned once the attempt budget is exhausted.
///
/// The display names the operation and attempt count; the last underlying
/// error is attached as `source` for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("operation '{operation}' failed after {attempts} attempts")]
pub struct RetryError {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

/// Invoke `op`, retrying failures with backoff per `policy`.
///
/// The first succeeding attempt resolves transparently; intermediate
/// failures are only visible as warnings in the log. After the final attempt
/// fails, returns a [`RetryError`] carrying the last underlying error.
///
/// Attempts form a single logical chain: the caller is suspended for the
/// duration of each attempt plus its backoff delay, and no concurrent
/// fan-out happens here.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Err(RetryError {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::exponential(3, Duration::from_millis(100), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_resolves_immediately() {
        let result = with_retry("fetch employees", &fast_policy(), || async { Ok(7u32) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_exhausts_attempt_budget() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = with_retry("update payroll run", &fast_policy(), || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("backend 503"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert!(err.to_string().contains("update payroll run"));
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.source().is_some_and(|s| s.to_string().contains("backend 503")));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_after_backoff() {
        let attempts = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = with_retry("fetch attendance", &fast_policy(), || {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok("page-2-data")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "page-2-data");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // Attempt 2 only runs after at least the base backoff delay.
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_policy_means_single_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = with_retry("one shot", &RetryPolicy::no_retry(), || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("nope"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
