//! Retry with exponential back-off and jitter for generation calls.
//!
//! Only transient failures (rate limiting, timeouts, network errors, 5xx) are
//! retried. Configuration, billing, and credential errors return immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::GenerationError;

pub(crate) fn is_retriable(err: &GenerationError) -> bool {
    match err {
        GenerationError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        GenerationError::Upstream { status, .. } => *status >= 500,
        other => other.kind().is_retryable(),
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors. Delay doubles from `backoff_base_ms` per attempt, ±25 % jitter,
/// capped at 60 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "generation transient error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn rate_limit_is_retriable() {
        assert!(is_retriable(&GenerationError::RateLimited("slow down".into())));
        assert!(is_retriable(&GenerationError::Timeout(60)));
    }

    #[test]
    fn payment_and_auth_are_not_retriable() {
        assert!(!is_retriable(&GenerationError::PaymentRequired("402".into())));
        assert!(!is_retriable(&GenerationError::Unauthorized {
            status: 401,
            body: String::new()
        }));
        assert!(!is_retriable(&GenerationError::MissingApiKey));
    }

    #[test]
    fn only_server_side_upstream_statuses_are_retriable() {
        let upstream = |status| GenerationError::Upstream {
            status,
            body: String::new(),
        };
        assert!(is_retriable(&upstream(500)));
        assert!(is_retriable(&upstream(503)));
        assert!(!is_retriable(&upstream(400)));
        assert!(!is_retriable(&upstream(422)));
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(GenerationError::RateLimited("429".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_payment_required() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(GenerationError::PaymentRequired("402".into()))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GenerationError::PaymentRequired(_))));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(GenerationError::Upstream {
                    status: 503,
                    body: "unavailable".into(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(GenerationError::Upstream { status: 503, .. })));
    }
}
