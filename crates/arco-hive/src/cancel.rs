//! Racing metastore calls against a cancellation token.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{CatalogError, CatalogResult};

/// Runs `fut` unless `cancel` fires first.
///
/// Cancellation is checked before polling the future, so an already-cancelled
/// token never starts the call.
///
/// # Errors
///
/// Returns [`CatalogError::Cancelled`] naming `operation` when the token fires
/// before the future completes.
pub async fn cancellable<F, T>(
    cancel: &CancellationToken,
    operation: &'static str,
    fut: F,
) -> CatalogResult<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CatalogError::Cancelled { operation }),
        value = fut => Ok(value),
    }
}

/// Fails fast when `cancel` has already fired.
///
/// # Errors
///
/// Returns [`CatalogError::Cancelled`] naming `operation`.
pub fn ensure_active(cancel: &CancellationToken, operation: &'static str) -> CatalogResult<()> {
    if cancel.is_cancelled() {
        return Err(CatalogError::Cancelled { operation });
    }
    Ok(())
}
