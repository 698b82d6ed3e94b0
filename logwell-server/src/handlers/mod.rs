pub mod logs;
pub mod tail;

use std::future::Future;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Run a read query under the configured soft deadline. An abandoned read
/// surfaces as a `timeout` error; ingestion is unaffected.
pub async fn with_deadline<T, F>(deadline: Duration, query: F) -> AppResult<T>
where
    F: Future<Output = logwell_core::Result<T>>,
{
    match tokio::time::timeout(deadline, query).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::timeout()),
    }
}
