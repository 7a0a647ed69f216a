//! Bounded retry with exponential backoff
//!
//! Re-invokes a failing operation while a predicate classifies the error as
//! retryable. Exhaustion propagates the last underlying error unchanged so
//! the root cause stays visible.

use crate::error::{DroverError, DroverResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Message fragments that mark a driver error as transient.
///
/// Intentionally conservative: unknown errors are not retried.
const RETRYABLE_FRAGMENTS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection closed",
    "broken pipe",
    "socket",
];

/// Retry schedule: `max_attempts` retries after the initial attempt, with
/// `base_delay * backoff_multiplier^attempt` between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Retries after the first attempt; total invocations = `max_attempts + 1`
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryOptions {
    /// Backoff delay before retry number `attempt` (0-based), rounded to
    /// whole milliseconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .mul_f64(self.backoff_multiplier.powi(attempt as i32));
        Duration::from_millis(delay.as_millis() as u64)
    }
}

/// Default retryable-error predicate: deadline expiries and driver errors
/// whose message looks like a transport/connection failure.
pub fn is_transient(error: &DroverError) -> bool {
    if matches!(error, DroverError::Timeout { .. }) {
        return true;
    }
    if !matches!(error, DroverError::Driver(_)) {
        return false;
    }
    let message = error.to_string().to_lowercase();
    RETRYABLE_FRAGMENTS
        .iter()
        .any(|fragment| message.contains(fragment))
}

/// Invoke `operation` up to `options.max_attempts + 1` times.
///
/// After a failure, `should_retry` decides whether another attempt happens;
/// if it declines or attempts are exhausted the error is returned as-is.
/// `on_retry(next_attempt, error, delay)` fires before each backoff sleep.
pub async fn with_retry<T, F, Fut, P, H>(
    options: &RetryOptions,
    mut should_retry: P,
    mut on_retry: H,
    mut operation: F,
) -> DroverResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DroverResult<T>>,
    P: FnMut(&DroverError) -> bool,
    H: FnMut(u32, &DroverError, Duration),
{
    let mut last_error = None;

    for attempt in 0..=options.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= options.max_attempts || !should_retry(&error) {
                    return Err(error);
                }

                let delay = options.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = options.max_attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after failure"
                );
                on_retry(attempt + 1, &error, delay);
                last_error = Some(error);
                sleep(delay).await;
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| DroverError::Other("retry loop completed without executing".into())))
}

/// [`with_retry`] with the default transient-error predicate and no hook.
pub async fn with_default_retry<T, F, Fut>(options: &RetryOptions, operation: F) -> DroverResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DroverResult<T>>,
{
    with_retry(options, is_transient, |_, _, _| {}, operation).await
}
