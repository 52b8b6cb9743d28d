//! Bounded execution for calls into external collaborators.

use crate::PlatformError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `future` with an upper time bound.
///
/// An elapsed bound surfaces as [`PlatformError::Timeout`]. The operation is
/// never retried here.
///
/// # Errors
///
/// Returns the future's own error, or a timeout error if the bound elapsed.
pub async fn with_timeout<T, F>(
    limit: Duration,
    operation: &str,
    future: F,
) -> Result<T, PlatformError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation = %operation, timeout_ms = limit.as_millis(), "Operation timed out");
            Err(PlatformError::timeout(operation))
        }
    }
}
