//! Retryable-request executor.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::backoff;
use super::classify::Classify;
use super::policy::RetryPolicy;

/// A retry about to happen, as delivered to channel observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEvent {
    /// 1-based number of the retry being scheduled.
    pub attempt: u32,
    pub delay: Duration,
    pub error: String,
}

/// Receives a notification before each backoff wait.
pub trait RetryObserver<E> {
    fn on_retry(&self, attempt: u32, delay: Duration, error: &E);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<E> RetryObserver<E> for NoopObserver {
    fn on_retry(&self, _attempt: u32, _delay: Duration, _error: &E) {}
}

/// Observer that logs each retry at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl<E: fmt::Display> RetryObserver<E> for TracingObserver {
    fn on_retry(&self, attempt: u32, delay: Duration, error: &E) {
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Request failed, retrying"
        );
    }
}

impl<E: fmt::Display> RetryObserver<E> for mpsc::UnboundedSender<RetryEvent> {
    fn on_retry(&self, attempt: u32, delay: Duration, error: &E) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(RetryEvent {
            attempt,
            delay,
            error: error.to_string(),
        });
    }
}

impl<E, F> RetryObserver<E> for F
where
    F: Fn(u32, Duration, &E),
{
    fn on_retry(&self, attempt: u32, delay: Duration, error: &E) {
        self(attempt, delay, error)
    }
}

/// Run `operation` under `policy` without an observer.
pub async fn execute<F, Fut, T, E>(operation: F, policy: &RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    execute_observed(operation, policy, &NoopObserver).await
}

/// Run `operation`, retrying retryable failures with backoff.
///
/// # Postconditions
/// - `operation` is invoked at most `policy.max_retries + 1` times
/// - attempts never overlap; each starts after the previous one settled
///   and its backoff elapsed
/// - the returned error is the last attempt's error, unchanged
pub async fn execute_observed<F, Fut, T, E, O>(
    mut operation: F,
    policy: &RetryPolicy,
    observer: &O,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
    O: RetryObserver<E> + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(attempt = attempt + 1, error = %err, "Non-retryable failure");
            return Err(err);
        }

        if attempt >= policy.max_retries {
            debug!(attempts = attempt + 1, error = %err, "Retries exhausted");
            return Err(err);
        }

        let wait = backoff::delay(attempt, policy.base_delay, policy.max_delay);
        observer.on_retry(attempt + 1, wait, &err);
        debug!(
            attempt = attempt + 1,
            max_attempts = policy.max_attempts(),
            delay_ms = wait.as_millis() as u64,
            "Retrying after failure"
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::retry::{classify_status, ErrorClass};

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Http(u16),
        Network,
        Cancelled,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Http(status) => write!(f, "HTTP {}", status),
                Self::Network => write!(f, "network unreachable"),
                Self::Cancelled => write!(f, "cancelled"),
            }
        }
    }

    impl Classify for TestError {
        fn class(&self) -> ErrorClass {
            match self {
                Self::Http(status) => classify_status(*status),
                Self::Network => ErrorClass::Retryable,
                Self::Cancelled => ErrorClass::Cancelled,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(42) }
            },
            &RetryPolicy::standard(),
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_fails_immediately() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::Http(404)) }
            },
            &RetryPolicy::standard(),
        )
        .await;

        assert_eq!(result, Err(TestError::Http(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_unavailable_exhausts_standard_policy() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::standard();
        let result = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::Http(503)) }
            },
            &policy,
        )
        .await;

        assert_eq!(result, Err(TestError::Http(503)));
        assert_eq!(calls.load(Ordering::SeqCst), policy.max_retries + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = execute(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError::Network)
                    } else {
                        Ok("ok")
                    }
                }
            },
            &RetryPolicy::quick(),
        )
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::Cancelled) }
            },
            &RetryPolicy::aggressive(),
        )
        .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_bound_holds_for_every_preset() {
        for policy in [
            RetryPolicy::none(),
            RetryPolicy::quick(),
            RetryPolicy::standard(),
            RetryPolicy::aggressive(),
        ] {
            let calls = AtomicU32::new(0);
            let _ = execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(TestError::Http(500)) }
                },
                &policy,
            )
            .await;
            assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_retry_before_waiting() {
        let seen: Mutex<Vec<(u32, Duration)>> = Mutex::new(Vec::new());
        let observer = |attempt: u32, delay: Duration, err: &TestError| {
            assert_eq!(*err, TestError::Http(429));
            seen.lock().unwrap().push((attempt, delay));
        };
        let policy = RetryPolicy::quick();
        let started = tokio::time::Instant::now();

        let _ = execute_observed(
            || async { Err::<(), _>(TestError::Http(429)) },
            &policy,
            &observer,
        )
        .await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.iter().map(|(a, _)| *a).collect::<Vec<_>>(), vec![1, 2]);
        // 500ms and 1000ms floors, each with < 30% jitter
        assert!(seen[0].1 >= Duration::from_millis(500) && seen[0].1 < Duration::from_millis(650));
        assert!(seen[1].1 >= Duration::from_millis(1_000) && seen[1].1 < Duration::from_millis(1_300));
        let total: Duration = seen.iter().map(|(_, d)| *d).sum();
        assert!(started.elapsed() >= total);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_observer_receives_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _ = execute_observed(
            || async { Err::<(), _>(TestError::Network) },
            &RetryPolicy::quick(),
            &tx,
        )
        .await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].attempt, 1);
        assert_eq!(events[1].error, "network unreachable");
    }
}
