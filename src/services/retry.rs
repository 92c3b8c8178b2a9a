use std::future::Future;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Run `action` up to `max_attempts` times, sleeping between tries with a
/// linearly increasing delay (`base_delay * attempt`). Errors that
/// `is_retryable` rejects are returned immediately.
pub async fn retry_with_backoff<T, F, Fut, R>(
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: R,
    mut action: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    R: Fn(&AppError) -> bool,
{
    let mut attempt: u32 = 1;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                log::warn!(
                    "Attempt {}/{} failed, retrying: {}",
                    attempt,
                    max_attempts,
                    err
                );
                tokio::time::sleep(base_delay * attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(
            3,
            Duration::from_millis(1),
            |err| err.is_remote(),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::RemoteProtocol("transient".into()))
                } else {
                    Ok(42)
                }
            },
        )
        .await;

        assert_eq!(result.expect("should eventually succeed"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = retry_with_backoff(
            3,
            Duration::from_millis(1),
            |err| err.is_remote(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::DatabaseError("down".into()))
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::DatabaseError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn returns_last_error_after_exhausting_attempts() {
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = retry_with_backoff(
            3,
            Duration::from_millis(1),
            |_| true,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::RemoteProtocol(format!("failure {}", n)))
            },
        )
        .await;

        match result {
            Err(AppError::RemoteProtocol(message)) => assert_eq!(message, "failure 2"),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
