//! Deadlines around collaborator calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SagaError};

/// Runs `fut` under `limit`. Elapsing is reported as a failure of `service`.
pub async fn within<T, E, F>(service: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<SagaError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(service, ?limit, "deadline elapsed");
            Err(SagaError::external(
                service,
                format!("timed out after {}ms", limit.as_millis()),
            ))
        }
    }
}
