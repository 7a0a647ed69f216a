//! Deadline guard for driver-boundary operations
//!
//! Races one operation against a timer; whichever finishes first decides
//! the outcome. The losing future is dropped, which cancels it at its next
//! await point. Driver-side work that was already submitted is not undone.

use crate::error::{DroverError, DroverResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `operation` with an upper bound of `duration`.
///
/// Returns a [`DroverError::Timeout`] tagged with `label` and the configured
/// duration when the timer wins. No retries happen here; compose with
/// [`crate::retry::with_retry`] per attempt.
pub async fn with_deadline<T, F>(label: &str, duration: Duration, operation: F) -> DroverResult<T>
where
    F: Future<Output = DroverResult<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(label, ?duration, "operation exceeded deadline");
            Err(DroverError::timeout(label, duration))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn fast_operation_wins() {
        let result = with_deadline("fast", Duration::from_millis(200), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn slow_operation_times_out_at_the_deadline() {
        let started = Instant::now();
        let result: DroverResult<u32> = with_deadline("slow", Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(1)
        })
        .await;

        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(400), "timer should win, took {elapsed:?}");
        match result {
            Err(DroverError::Timeout { label, duration }) => {
                assert_eq!(label, "slow");
                assert_eq!(duration, Duration::from_millis(100));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn operation_error_passes_through() {
        let result: DroverResult<u32> = with_deadline("failing", Duration::from_millis(100), async {
            Err(DroverError::driver("boom"))
        })
        .await;
        assert!(matches!(result, Err(DroverError::Driver(_))));
    }
}
