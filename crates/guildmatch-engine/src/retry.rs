//! Bounded exponential backoff for transient external failures.

use guildmatch_core::{MatchError, Result, RetryConfig};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `op`, retrying transient failures (see
/// [`MatchError::is_transient`]) with exponential backoff up to
/// `cfg.max_attempts` total attempts. Non-transient errors and the final
/// transient error are surfaced unchanged.
pub async fn with_retry<T, F, Fut>(cfg: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Duration::from_millis(cfg.initial_backoff_ms);
    let max_backoff = Duration::from_millis(cfg.max_backoff_ms);
    let mut attempt = 1usize;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < cfg.max_attempts => {
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err, "Transient failure, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_retry(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(&fast_retry(4), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MatchError::index_unavailable("connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_retry(&fast_retry(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MatchError::index_unavailable("still down")) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), MatchError::IndexUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_retry(&fast_retry(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MatchError::invalid_input("bad request")) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), MatchError::InvalidInput(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
