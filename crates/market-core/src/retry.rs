//! Read Retry
//!
//! Idempotent reads get exactly one more attempt after an external failure.
//! Writes and payment submissions never go through here.

use std::future::Future;

use crate::error::Result;

/// Run `op`, retrying once if it fails with a retryable error
pub async fn retry_read<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(err) if err.is_retryable() => {
            tracing::warn!(operation = what, error = %err, "Read failed, retrying once");
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::MarketError;

    #[tokio::test]
    async fn test_retries_external_failure_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_read("list", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(MarketError::external("connection reset"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry_read("list", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(MarketError::external("down"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_validation() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry_read("list", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(MarketError::validation("bad"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
