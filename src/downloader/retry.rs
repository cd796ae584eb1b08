//! Retry with linear backoff.
//!
//! Attempt `n` that fails transiently waits `base_delay * n` before the next
//! one. Fatal errors end the loop at once; benign extractor warnings are
//! retried after a flat `base_delay`.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::{DownloadError, ErrorClass};

/// Retry strategy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(3),
        }
    }
}

/// Passed to the observer before each wait
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: &'a DownloadError,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy that tries exactly once
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32, class: ErrorClass) -> Duration {
        match class {
            ErrorClass::Benign => self.base_delay,
            _ => self.base_delay.saturating_mul(attempt),
        }
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` receives the attempt number and the previous attempt's error so
    /// it can adjust (e.g. relax TLS after a handshake failure). On
    /// exhaustion the last error is returned.
    pub async fn run<T, F, Fut, N>(&self, mut op: F, mut on_retry: N) -> Result<T, DownloadError>
    where
        F: FnMut(u32, Option<&DownloadError>) -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
        N: FnMut(&RetryEvent<'_>),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error: Option<DownloadError> = None;

        for attempt in 1..=max_attempts {
            let error = match op(attempt, last_error.as_ref()).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("[Retry] Succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let class = error.class();
            if class == ErrorClass::Fatal {
                debug!("[Retry] Fatal error, not retrying: {}", error);
                return Err(error);
            }

            if attempt < max_attempts {
                let delay = self.delay_for(attempt, class);
                warn!(
                    "[Retry] Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    error.kind(),
                    delay
                );
                on_retry(&RetryEvent {
                    attempt,
                    max_attempts,
                    delay,
                    error: &error,
                });
                tokio::time::sleep(delay).await;
            } else {
                warn!(
                    "[Retry] Failed after {} attempts ({}): {}",
                    max_attempts,
                    error.kind(),
                    error
                );
            }
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| DownloadError::Unknown("retry loop ran zero attempts".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, ErrorClass::Transient), Duration::from_secs(3));
        assert_eq!(policy.delay_for(2, ErrorClass::Transient), Duration::from_secs(6));
        assert_eq!(policy.delay_for(4, ErrorClass::Transient), Duration::from_secs(12));
        assert_eq!(policy.delay_for(4, ErrorClass::Benign), Duration::from_secs(3));
    }

    #[test]
    fn test_huge_delay_saturates() {
        let policy = RetryPolicy::new(5, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay_for(3, ErrorClass::Transient), Duration::MAX);
    }

    #[tokio::test]
    async fn test_n_transient_failures_then_success() {
        for failures in 0..4u32 {
            let calls = AtomicU32::new(0);
            let result = fast(5)
                .run(
                    |_, _| {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if n < failures {
                                Err(DownloadError::Network("reset".into()))
                            } else {
                                Ok("done")
                            }
                        }
                    },
                    |_| {},
                )
                .await;

            assert_eq!(result.unwrap(), "done");
            assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
        }
    }

    #[tokio::test]
    async fn test_fatal_error_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(5)
            .run(
                |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(DownloadError::InvalidUrl("nope".into())) }
                },
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(DownloadError::InvalidUrl(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let mut notified = Vec::new();
        let result: Result<(), _> = fast(3)
            .run(
                |attempt, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(DownloadError::Timeout(format!("attempt {}", attempt))) }
                },
                |event| notified.push(event.attempt),
            )
            .await;

        match result {
            Err(DownloadError::Timeout(msg)) => assert_eq!(msg, "attempt 3"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(notified, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_previous_error_is_visible_to_next_attempt() {
        let mut seen_tls = Vec::new();
        let result = fast(3)
            .run(
                |attempt, previous| {
                    seen_tls.push(previous.map(DownloadError::is_tls).unwrap_or(false));
                    async move {
                        if attempt == 1 {
                            Err(DownloadError::Tls("EOF occurred in violation of protocol".into()))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(seen_tls, vec![false, true]);
    }

    #[tokio::test]
    async fn test_benign_warning_is_retried() {
        let calls = AtomicU32::new(0);
        let mut warnings = 0;
        let result = fast(5)
            .run(
                |_, _| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(DownloadError::BenignWarning("Switching to client: TV".into()))
                        } else {
                            Ok(())
                        }
                    }
                },
                |event| {
                    if event.error.class() == ErrorClass::Benign {
                        warnings += 1;
                    }
                },
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _ = fast(0)
            .run(
                |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, DownloadError>(()) }
                },
                |_| {},
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
