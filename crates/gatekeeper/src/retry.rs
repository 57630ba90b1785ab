//! Bounded retry for transient platform and store failures.

use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

use gatekeeper_common::GatekeeperError;

use crate::config::RetryConfig;

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// configured attempts are used up. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    what: &'static str,
    mut op: F,
) -> Result<T, GatekeeperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatekeeperError>>,
{
    let strategy = ExponentialBackoff::from_millis(config.base_delay_ms.max(1))
        .max_delay(Duration::from_millis(config.max_delay_ms))
        .map(jitter)
        .take(config.attempts.saturating_sub(1));

    let mut attempt = 0usize;
    RetryIf::spawn(
        strategy,
        || {
            attempt += 1;
            if attempt > 1 {
                tracing::debug!(what, attempt, "Retrying");
            }
            op()
        },
        |e: &GatekeeperError| {
            let retry = e.is_retryable();
            if retry {
                tracing::warn!(what, error = %e, "Transient failure");
            }
            retry
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(attempts: usize) -> RetryConfig {
        RetryConfig {
            attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = with_retry(&fast(3), "flaky", || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatekeeperError::Platform("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast(2), "down", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(GatekeeperError::Timeout("no answer".into())) }
        })
        .await;

        assert!(matches!(result, Err(GatekeeperError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&fast(5), "forbidden", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(GatekeeperError::PlatformRejected("not enough rights".into())) }
        })
        .await;

        assert!(matches!(result, Err(GatekeeperError::PlatformRejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
