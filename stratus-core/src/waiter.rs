//! Waiter - Poll a refresh function until a target status is observed
//!
//! Waiters drive the "retry until stable" part of CRUD handlers: after a create
//! or delete the handler polls a finder until the object reports one of the
//! target statuses, an unexpected status shows up, or the timeout elapses.
//! Dropping the returned future cancels the wait.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::{Instant, sleep};

use crate::provider::{ErrorKind, ProviderError, ProviderResult};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Configuration of a status wait
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    /// Statuses that mean "keep waiting"
    pub pending: Vec<String>,
    /// Statuses that mean "done". Empty means the object is expected to vanish.
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Lower bound on the backoff between refreshes
    pub min_poll_interval: Duration,
    /// Fixed interval between refreshes, overriding the backoff
    pub poll_interval: Option<Duration>,
    /// Consecutive not-found refreshes tolerated while a target is expected
    pub not_found_checks: u32,
    /// Consecutive target observations required before succeeding
    pub continuous_target_occurrence: u32,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            min_poll_interval: Duration::ZERO,
            poll_interval: None,
            not_found_checks: 20,
            continuous_target_occurrence: 1,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn continuous_target_occurrence(mut self, n: u32) -> Self {
        self.continuous_target_occurrence = n.max(1);
        self
    }

    /// Poll `refresh` until a target status is reached.
    ///
    /// `refresh` returns `None` when the object cannot be found, otherwise the
    /// object and its current status. Returns `Ok(None)` only for waits with an
    /// empty target list once the object is gone.
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> ProviderResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Option<(T, String)>>>,
    {
        let deadline = Instant::now() + self.timeout;
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let mut backoff = INITIAL_BACKOFF;
        let mut not_found_count = 0;
        let mut target_count = 0;
        let mut last_status: Option<String> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timeout_error(last_status.as_deref()));
            }

            let refreshed = tokio::time::timeout(remaining, refresh())
                .await
                .map_err(|_| self.timeout_error(last_status.as_deref()))??;

            match refreshed {
                None => {
                    target_count = 0;
                    if self.target.is_empty() {
                        return Ok(None);
                    }
                    not_found_count += 1;
                    if not_found_count > self.not_found_checks {
                        return Err(ProviderError::not_found(format!(
                            "couldn't find resource ({} retries)",
                            self.not_found_checks
                        )));
                    }
                }
                Some((value, status)) => {
                    not_found_count = 0;
                    debug!("waiter observed status '{}'", status);
                    if self.target.contains(&status) {
                        target_count += 1;
                        if target_count >= self.continuous_target_occurrence {
                            return Ok(Some(value));
                        }
                    } else if self.pending.contains(&status) {
                        target_count = 0;
                    } else {
                        return Err(ProviderError::with_kind(
                            ErrorKind::Api,
                            format!(
                                "unexpected state '{}', wanted target '{}'",
                                status,
                                self.target.join(", ")
                            ),
                        ));
                    }
                    last_status = Some(status);
                }
            }

            let interval = match self.poll_interval {
                Some(interval) => interval,
                None => {
                    let interval = backoff.max(self.min_poll_interval);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    interval
                }
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(interval.min(remaining)).await;
        }
    }

    fn timeout_error(&self, last_status: Option<&str>) -> ProviderError {
        ProviderError::timeout(format!(
            "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
            self.target.join(", "),
            last_status.unwrap_or(""),
            self.timeout
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Refresh function replaying a scripted list of observations
    fn script(
        steps: Vec<Option<&'static str>>,
    ) -> impl FnMut() -> std::future::Ready<ProviderResult<Option<(u32, String)>>> {
        let mut steps = steps.into_iter();
        let mut n = 0;
        move || {
            n += 1;
            let step = steps.next().flatten();
            std::future::ready(Ok(step.map(|s| (n, s.to_string()))))
        }
    }

    fn conf(pending: &[&str], target: &[&str]) -> StateChangeConf {
        StateChangeConf::new(pending, target, Duration::from_secs(2))
            .poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn returns_once_target_reached() {
        let result = conf(&["pending"], &["available"])
            .wait_for_state(script(vec![Some("pending"), Some("pending"), Some("available")]))
            .await
            .unwrap();
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn unexpected_state_fails() {
        let err = conf(&["pending"], &["available"])
            .wait_for_state(script(vec![Some("pending"), Some("failed")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
        assert!(err.message.contains("unexpected state 'failed'"));
    }

    #[tokio::test]
    async fn empty_target_succeeds_when_object_vanishes() {
        let result = conf(&["deleting"], &[])
            .wait_for_state(script(vec![Some("deleting"), None]))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn not_found_checks_are_bounded() {
        let err = conf(&["pending"], &["available"])
            .not_found_checks(2)
            .wait_for_state(script(vec![None, None, None, Some("available")]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn not_found_within_budget_keeps_waiting() {
        let result = conf(&["pending"], &["available"])
            .not_found_checks(2)
            .wait_for_state(script(vec![None, None, Some("available")]))
            .await
            .unwrap();
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn continuous_target_occurrence_resets_on_pending() {
        let result = conf(&["pending"], &["available"])
            .continuous_target_occurrence(2)
            .wait_for_state(script(vec![
                Some("available"),
                Some("pending"),
                Some("available"),
                Some("available"),
            ]))
            .await
            .unwrap();
        assert_eq!(result, Some(4));
    }

    #[tokio::test]
    async fn times_out_with_last_status() {
        let err = StateChangeConf::new(&["pending"], &["available"], Duration::from_millis(20))
            .poll_interval(Duration::from_millis(2))
            .wait_for_state(|| async { Ok(Some(((), "pending".to_string()))) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("last state: 'pending'"));
    }

    #[tokio::test]
    async fn refresh_errors_surface_immediately() {
        let err = conf(&["pending"], &["available"])
            .wait_for_state(|| async {
                Err::<Option<((), String)>, _>(ProviderError::new("AccessDenied"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.message, "AccessDenied");
    }
}
