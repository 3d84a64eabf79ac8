//! Retry - Bounded retries for transient API failures
//!
//! Throttling and transient faults are retried with exponential backoff before
//! the error is surfaced. Newly created objects that are not yet visible are
//! retried separately by [`retry_when_not_found`].

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::time::{Instant, sleep};

use crate::provider::{ProviderError, ProviderResult};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(base.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Run `op`, retrying while `should_retry` accepts the error and retries remain
pub async fn retry_when<T, F, Fut, P>(
    policy: &RetryPolicy,
    mut op: F,
    should_retry: P,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
    P: Fn(&ProviderError) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && should_retry(&e) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "retrying after {:?} (attempt {}/{}): {}",
                    delay,
                    attempt + 1,
                    policy.max_retries,
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retry throttling and transient service errors
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    retry_when(policy, op, ProviderError::is_retryable).await
}

/// Retry a lookup of a just-created object until it becomes visible.
///
/// Only `NotFound` is retried; any other error returns immediately. When the
/// timeout passes the last `NotFound` is surfaced.
pub async fn retry_when_not_found<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_not_found() && Instant::now() + interval <= deadline => {
                log::debug!("object not visible yet, retrying: {}", e);
                sleep(interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .max_retries(retries)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_transient(&fast_policy(3), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::retryable("Throttling"))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ProviderResult<()> = retry_transient(&fast_policy(2), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::retryable("Throttling"))
        })
        .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ProviderResult<()> = retry_transient(&fast_policy(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::new("AccessDenied"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Api);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_retried_until_visible() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_when_not_found(
            Duration::from_secs(1),
            Duration::from_millis(1),
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::not_found("not yet"))
                } else {
                    Ok(7)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn last_not_found_is_surfaced_after_timeout() {
        let result: ProviderResult<()> = retry_when_not_found(
            Duration::from_millis(10),
            Duration::from_millis(3),
            move || async move { Err(ProviderError::not_found("never")) },
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message, "never");
    }
}
