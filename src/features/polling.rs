//! Fixed-delay retry loop for reads that are polled until the ledger answers.
//!
//! The hint engine never calls into this module; it is for callers that keep
//! a view refreshed and want transient failures retried.

use crate::domain::error::Result;
use std::future::Future;
use std::time::Duration;

/// Runs `op` until it succeeds or fails with a non-transient error.
pub async fn poll_until_ok<T, F, Fut>(label: &str, delay: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    poll_with_limit(label, delay, None, op).await
}

/// Like [`poll_until_ok`], giving up after `max_attempts` with the last error.
pub async fn poll_with_limit<T, F, Fut>(
    label: &str,
    delay: Duration,
    max_attempts: Option<u32>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() => return Err(error),
            Err(error) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    tracing::warn!(label, attempt, %error, "poll_gave_up");
                    return Err(error);
                }
                tracing::warn!(label, attempt, %error, "poll_retry");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
