//! External lock acquisition.
//!
//! ```text
//! lock() ──► WAITING ──check_lock()──► ACQUIRED
//!               │  ▲
//!               │  └── sleep 50ms ◄── still WAITING, within both timeouts
//!               ├──► TIMED OUT   (total wait or one check call too slow)
//!               ├──► DENIED / check error
//!               └──► CANCELLED
//! ```
//!
//! Every exit other than `ACQUIRED` releases the lock id before returning, so
//! abandoned requests do not pile up in the lock service.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cancel::cancellable;
use crate::config::CommitConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::metastore::{LockRequest, LockService, LockState};
use crate::metrics;
use crate::pointer::TableIdent;

/// Pause between unsuccessful lock status checks.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How the polling loop ended.
enum PollExit {
    Settled,
    TimedOut,
    CheckFailed,
    Cancelled,
}

/// Acquires an exclusive lock on `table` and returns its lock id.
///
/// # Errors
///
/// - [`CatalogError::Communication`] when the initial lock request fails
/// - [`CatalogError::CommitFailed`] on timeout, denial or a failed status check
/// - [`CatalogError::Cancelled`] when `cancel` fires during the request or
///   while waiting
pub async fn acquire_table_lock(
    locks: &dyn LockService,
    table: &TableIdent,
    config: &CommitConfig,
    cancel: &CancellationToken,
) -> CatalogResult<i64> {
    let request = LockRequest::exclusive(table.clone(), config.lock_owner.clone());
    // A request abandoned here leaves no lock id to release; the lock service
    // expires the orphaned request on its own.
    let response = cancellable(cancel, "lock", locks.lock(&request))
        .await
        .inspect_err(|_| metrics::record_lock_failure("cancelled"))?
        .map_err(|e| {
            CatalogError::communication(format!("Metastore operation failed for {table}"), e)
        })?;
    let lock_id = response.lock_id;
    let span = arco_core::observability::lock_span(&table.to_string(), lock_id);

    async {
        let start = Instant::now();
        let mut state = response.state;
        let mut waited = Duration::ZERO;
        let mut last_call = Duration::ZERO;

        let exit = if cancel.is_cancelled() {
            PollExit::Cancelled
        } else {
            loop {
                if state != LockState::Waiting {
                    break PollExit::Settled;
                }

                let call_start = Instant::now();
                let checked = cancellable(cancel, "lock", locks.check_lock(lock_id)).await;
                last_call = call_start.elapsed();
                match checked {
                    Err(_) => break PollExit::Cancelled,
                    Ok(Err(error)) => {
                        tracing::warn!(%table, lock_id, %error, "failed to check lock state");
                        break PollExit::CheckFailed;
                    }
                    Ok(Ok(checked)) => state = checked.state,
                }
                if state == LockState::Acquired {
                    break PollExit::Settled;
                }

                waited = start.elapsed();
                if waited > config.lock_acquire_timeout || last_call > config.check_lock_timeout {
                    break PollExit::TimedOut;
                }
                if cancellable(cancel, "lock", tokio::time::sleep(LOCK_POLL_INTERVAL))
                    .await
                    .is_err()
                {
                    break PollExit::Cancelled;
                }
            }
        };
        metrics::record_lock_wait(start.elapsed());

        if state == LockState::Acquired {
            tracing::debug!(%table, lock_id, "lock acquired");
            return Ok(lock_id);
        }
        release_lock(locks, table, lock_id).await;

        match exit {
            PollExit::Cancelled => {
                metrics::record_lock_failure("cancelled");
                Err(CatalogError::Cancelled { operation: "lock" })
            }
            PollExit::TimedOut => {
                metrics::record_lock_failure("timeout");
                Err(CatalogError::commit_failed(format!(
                    "Timed out after {} ms waiting for lock on {table}. \
                     Last check lock call takes {} ms",
                    waited.as_millis(),
                    last_call.as_millis()
                )))
            }
            PollExit::Settled | PollExit::CheckFailed => {
                metrics::record_lock_failure("state");
                Err(CatalogError::commit_failed(format!(
                    "Could not acquire the lock on {table}, lock request ended in state {state}"
                )))
            }
        }
    }
    .instrument(span)
    .await
}

/// Releases `lock_id`, logging instead of failing.
pub async fn release_lock(locks: &dyn LockService, table: &TableIdent, lock_id: i64) {
    match locks.unlock(lock_id).await {
        Ok(()) => tracing::debug!(%table, lock_id, "lock released"),
        Err(error) => {
            tracing::warn!(%table, lock_id, %error, "failed to release lock");
        }
    }
}
