//! Back-off for CMS calls. Rate limits, 5xx and network failures retry;
//! everything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::PublishError;

fn is_retriable(err: &PublishError) -> bool {
    match err {
        PublishError::RateLimited { .. } => true,
        PublishError::Publish { status, .. } => *status >= 500,
        PublishError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        _ => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts. The wait
/// before retry n is `backoff_base_ms * 2^(n-1)` with ±25 % jitter.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, PublishError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PublishError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let base = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (base as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(attempt, max_retries, delay_ms, error = %err, "publish retry");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
