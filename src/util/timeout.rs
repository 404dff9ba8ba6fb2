//! Deadline helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ToolLoopError;

/// Run a fallible future under a deadline, mapping expiry to
/// [`ToolLoopError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ToolLoopError>>,
) -> Result<T, ToolLoopError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ToolLoopError::Timeout(duration.as_millis() as u64)),
    }
}
