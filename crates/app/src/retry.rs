//! Timeout and single-retry helpers for persistence calls.

use std::future::Future;
use std::time::Duration;

use brewlink_domain::error::BrewLinkError;

/// Bound `fut` by `limit`, mapping expiry to [`BrewLinkError::Timeout`].
///
/// # Errors
///
/// Returns the inner error, or [`BrewLinkError::Timeout`] on expiry.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, BrewLinkError>
where
    F: Future<Output = Result<T, BrewLinkError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(BrewLinkError::Timeout(limit)))
}

/// Run `op` with a timeout; on failure log and try exactly once more.
///
/// # Errors
///
/// Returns the error of the second attempt.
pub async fn retry_once<T, F, Fut>(
    operation: &'static str,
    limit: Duration,
    mut op: F,
) -> Result<T, BrewLinkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrewLinkError>>,
{
    match with_timeout(limit, op()).await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(operation, error = %err, "persistence call failed, retrying once");
            with_timeout(limit, op()).await
        }
    }
}
