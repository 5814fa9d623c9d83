//! crates/listings_core/src/deadline.rs
//!
//! Every call into a backend goes through [`within`], so a slow database or cache
//! surfaces as `PortError::Unavailable` instead of hanging the request.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::ports::{PortError, PortResult};

/// Runs `fut` with a deadline. Overrunning it is a backend failure, never a
/// business outcome such as `NotFound`.
pub async fn within<T, F>(limit: Duration, op: &'static str, fut: F) -> PortResult<T>
where
    F: Future<Output = PortResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(op, ?limit, "backend call exceeded its deadline");
            Err(PortError::Unavailable(format!(
                "{op} did not complete within {limit:?}"
            )))
        }
    }
}

/// Like [`within`], but the operation runs on its own task. If the caller gives
/// up (deadline or dropped request) a write that is already underway still
/// commits.
pub async fn detached<T, F>(limit: Duration, op: &'static str, fut: F) -> PortResult<T>
where
    T: Send + 'static,
    F: Future<Output = PortResult<T>> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    within(limit, op, async move {
        handle
            .await
            .map_err(|e| PortError::Unexpected(format!("{op} task failed: {e}")))?
    })
    .await
}
