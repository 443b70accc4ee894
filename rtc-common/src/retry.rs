//! Retry policy with exponential backoff.
//!
//! Every remote access is wrapped in a [`RetryPolicy`]. Call sites pick the
//! preset that matches the resource: file opens back off exponentially,
//! log scans and status probes retry at a fixed spacing.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// Upper bound for a single backoff wait.
///
/// Ten doubling attempts starting at 1s would otherwise stall for 8.5 minutes
/// in the last wait alone.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);

/// Errors that can be retried.
pub trait RetryableError {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;
}

/// Retry policy for remote operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first try (minimum 1).
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Factor applied to the wait for every further attempt (1.0 = fixed spacing).
    pub backoff_multiplier: f64,
    /// Ceiling for a single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::file_open()
    }
}

impl RetryPolicy {
    /// 10 attempts, 1s doubling. Used for opening remote files.
    pub fn file_open() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: MAX_BACKOFF_DELAY,
        }
    }

    /// 5 attempts, 10s fixed. Used for overview/log scans in the poll loop.
    pub fn log_scan() -> Self {
        Self::fixed(5, Duration::from_secs(10))
    }

    /// 10 attempts, 1s fixed. Used for traffic-light status probes.
    pub fn status_probe() -> Self {
        Self::fixed(10, Duration::from_secs(1))
    }

    /// 5 attempts, 1s fixed. Used for reading the system log version line.
    pub fn version_read() -> Self {
        Self::fixed(5, Duration::from_secs(1))
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Fixed spacing between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            backoff_multiplier: 1.0,
            max_delay: MAX_BACKOFF_DELAY.max(delay),
        }
    }

    /// Wait after the attempt with the given zero-based index failed.
    ///
    /// `initial_delay * backoff_multiplier^attempt_index`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let base_secs = self.initial_delay.as_secs_f64();
        let max_secs = self.max_delay.as_secs_f64().max(0.0);
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.max(0.0).powi(exponent);

        let delay = (base_secs * multiplier).min(max_secs);
        if delay.is_finite() && delay > 0.0 {
            Duration::from_secs_f64(delay)
        } else if delay > 0.0 {
            self.max_delay
        } else {
            Duration::ZERO
        }
    }

    /// Maximum attempts, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Sum of all waits when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (0..self.attempts().saturating_sub(1))
            .map(|index| self.backoff_delay(index))
            .sum()
    }
}

/// Outcome of a retried operation (success or final failure).
#[derive(Debug)]
pub struct Attempted<T> {
    /// Operation result of the last attempt.
    pub value: T,
    /// Number of attempts made (1-based).
    pub attempts: u32,
    /// Total time spent waiting between attempts.
    pub waited: Duration,
}

/// Run an async operation, retrying while the error is retryable.
///
/// Non-retryable errors abort immediately. The returned [`Attempted`]
/// carries the attempt count on both the success and the failure path.
pub async fn run_with_retry<F, Fut, T, E>(
    operation: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<Attempted<T>, Attempted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;
    let mut waited = Duration::ZERO;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Attempt succeeded after retry");
                }
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                    waited,
                });
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_delay(attempt - 1);
                debug!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "Attempt failed ({}), retrying after backoff",
                    err
                );
                sleep(delay).await;
                waited += delay;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(operation, attempt, "Retries exhausted: {}", err);
                } else {
                    debug!(operation, attempt, "Attempt failed (non-retryable): {}", err);
                }
                return Err(Attempted {
                    value: err,
                    attempts: attempt,
                    waited,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Retryable,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Retryable => write!(f, "retryable"),
                TestError::Fatal => write!(f, "fatal"),
            }
        }
    }

    impl RetryableError for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Retryable)
        }
    }

    #[test]
    fn test_file_open_preset() {
        let policy = RetryPolicy::file_open();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_log_scan_preset_is_fixed() {
        let policy = RetryPolicy::log_scan();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_delay_exponential() {
        let policy = RetryPolicy::file_open();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_delay_capped_at_max() {
        let policy = RetryPolicy::file_open();
        // 1 * 2^6 = 64 -> capped
        assert_eq!(policy.backoff_delay(6), MAX_BACKOFF_DELAY);
        assert_eq!(policy.backoff_delay(8), MAX_BACKOFF_DELAY);
        assert_eq!(policy.backoff_delay(u32::MAX), MAX_BACKOFF_DELAY);
    }

    #[test]
    fn test_backoff_zero_initial_delay() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        assert_eq!(policy.backoff_delay(2), Duration::ZERO);
    }

    #[test]
    fn test_total_backoff_file_open() {
        // 1 + 2 + 4 + 8 + 16 + 32 + 60 + 60 + 60
        assert_eq!(
            RetryPolicy::file_open().total_backoff(),
            Duration::from_secs(243)
        );
    }

    #[test]
    fn test_attempts_minimum_is_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::once()
        };
        assert_eq!(policy.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = run_with_retry("test", &RetryPolicy::file_open(), move || {
            let counter = counter.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError::Retryable)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(result.value, 42);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.waited, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<_, _> = run_with_retry("test", &RetryPolicy::file_open(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TestError::Fatal)
            }
        })
        .await;

        let failure = result.unwrap_err();
        assert!(matches!(failure.value, TestError::Fatal));
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.waited, Duration::ZERO);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_all_attempts() {
        let policy = RetryPolicy::fixed(4, Duration::from_secs(10));
        let started = tokio::time::Instant::now();

        let result: Result<Attempted<u32>, _> =
            run_with_retry("test", &policy, || async { Err(TestError::Retryable) }).await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(failure.waited, Duration::from_secs(30));
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
