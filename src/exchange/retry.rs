//! Bounded retry with exponential backoff for transient venue errors.
//!
//! Only errors classified transient by `FundarbError::is_transient` are
//! retried. Order submission must never be routed through this helper after
//! an ambiguous result; callers re-query venue state instead.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::Result;

pub async fn with_backoff<T, F, Fut>(label: &str, max_attempts: u8, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u8 = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = Duration::from_millis(100 * (1u64 << attempt));
                warn!(
                    "{}: attempt {}/{} failed transiently ({}), retrying in {:?}",
                    label, attempt, max_attempts, e, delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FundarbError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FundarbError::VenueTimeout("slow".to_string()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.expect("should succeed on third attempt"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FundarbError::Validation("bad input".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FundarbError::RateLimited("429".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
