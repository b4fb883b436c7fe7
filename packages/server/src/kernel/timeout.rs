use std::future::Future;
use std::time::Duration;

use anyhow::Result;

/// An external or store call that did not finish in time.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} timed out after {after:?}")]
pub struct TimedOut {
    pub operation: &'static str,
    pub after: Duration,
}

/// Bound a call. Elapsing yields a [`TimedOut`] error.
pub async fn with_timeout<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TimedOut {
            operation,
            after: limit,
        }
        .into()),
    }
}
