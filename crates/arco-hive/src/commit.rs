//! Lock-guarded, CAS-checked pointer commits.
//!
//! A commit moves the table pointer from `base` to a freshly written metadata
//! file:
//!
//! 1. Write the new metadata file (its location is provisional until applied).
//! 2. Take the process-local throttle for the table, then the external lock.
//! 3. Re-read the entry and compare its location with `base` (CAS check).
//! 4. Stamp the new location and apply it with `create_table`/`alter_table`.
//! 5. If the apply call failed in a way that leaves the persisted state
//!    unknown, re-read the entry to decide between SUCCESS, FAILURE and UNKNOWN.
//! 6. Cleanup always runs: the provisional file is deleted on FAILURE, the
//!    external lock is released and the local handle dropped.
//!
//! A provisional file is never deleted when the outcome is SUCCESS or UNKNOWN,
//! since the pointer may reference it.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cancel::{cancellable, ensure_active};
use crate::config::CommitConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::lock::{acquire_table_lock, release_lock};
use crate::metastore::{LockService, MetadataWriter, MetastoreError, PointerStore, UpdateOptions};
use crate::metrics;
use crate::pointer::{CachedMetadataVersion, TableEntry, TableIdent};
use crate::throttle::{LocalCommitThrottle, ScopedMutexHandle};

/// Outcome of a commit attempt as far as the pointer is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitStatus {
    /// The new location is (or was) the table's current metadata.
    Success,
    /// The new location was not applied.
    Failure,
    /// The pointer could not be inspected after an ambiguous failure.
    Unknown,
}

impl CommitStatus {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a commit creates the entry or moves an existing pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitPath {
    /// No base version: create the metastore entry.
    Create,
    /// Move the pointer of an existing entry.
    Update,
}

impl CommitPath {
    /// Picks the path from the presence of a base version.
    #[must_use]
    pub const fn for_base(base: Option<&CachedMetadataVersion>) -> Self {
        match base {
            Some(_) => Self::Update,
            None => Self::Create,
        }
    }

    /// Returns the label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// Resources held by one attempt, released by cleanup.
struct Attempt {
    status: CommitStatus,
    lock_id: Option<i64>,
    local: Option<ScopedMutexHandle>,
}

impl Attempt {
    const fn new() -> Self {
        Self {
            status: CommitStatus::Failure,
            lock_id: None,
            local: None,
        }
    }
}

/// Why an apply call did not succeed.
enum ApplyFailure {
    AlreadyExists,
    Metastore(MetastoreError),
    Cancelled,
}

/// Commits new metadata versions for one table.
pub struct CommitCoordinator<W: MetadataWriter> {
    store: Arc<dyn PointerStore>,
    locks: Arc<dyn LockService>,
    writer: Arc<W>,
    throttle: Arc<LocalCommitThrottle>,
    config: CommitConfig,
    table: TableIdent,
    full_name: String,
}

impl<W: MetadataWriter> fmt::Debug for CommitCoordinator<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitCoordinator")
            .field("table", &self.table)
            .field("full_name", &self.full_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<W: MetadataWriter> CommitCoordinator<W> {
    /// Creates a coordinator for `table` registered in `catalog`.
    #[must_use]
    pub fn new(
        store: Arc<dyn PointerStore>,
        locks: Arc<dyn LockService>,
        writer: Arc<W>,
        throttle: Arc<LocalCommitThrottle>,
        config: CommitConfig,
        catalog: &str,
        table: TableIdent,
    ) -> Self {
        let full_name = table.full_name(catalog);
        Self {
            store,
            locks,
            writer,
            throttle,
            config,
            table,
            full_name,
        }
    }

    /// Publishes `metadata` as the successor of `base`.
    ///
    /// `base` is `None` when the table does not exist yet. On success the
    /// returned version points at the newly written metadata file.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::CommitFailed`] when the base is stale or the lock
    ///   cannot be acquired; refresh and retry
    /// - [`CatalogError::AlreadyExists`] when a create collides with an entry
    /// - [`CatalogError::NotFound`] when an update finds no entry
    /// - [`CatalogError::CommitStateUnknown`] when an ambiguous apply failure
    ///   could not be reconciled
    /// - [`CatalogError::Communication`] or [`CatalogError::Cancelled`] for
    ///   transport failures and cancellation
    /// - [`CatalogError::MetadataWrite`] when the metadata file cannot be written
    pub async fn commit(
        &self,
        base: Option<&CachedMetadataVersion>,
        metadata: &W::Metadata,
        cancel: &CancellationToken,
    ) -> CatalogResult<CachedMetadataVersion> {
        let path = CommitPath::for_base(base);
        let span = arco_core::observability::commit_span(&self.full_name, path.as_str());

        async {
            ensure_active(cancel, "write_metadata")?;
            let version = base.map_or(0, CachedMetadataVersion::next_version);
            let new_location = self
                .writer
                .write_new_version(metadata, version)
                .await
                .map_err(|source| CatalogError::MetadataWrite {
                    table: self.full_name.clone(),
                    source,
                })?;
            tracing::debug!(%new_location, version, "wrote provisional metadata file");

            let mut attempt = Attempt::new();
            let result = self
                .attempt(&mut attempt, path, base, &new_location, cancel)
                .await;
            let status = attempt.status;
            self.cleanup(attempt, &new_location).await;
            metrics::record_commit(status.as_str());

            match result {
                Ok(()) => {
                    tracing::info!(%new_location, "committed new metadata location");
                    Ok(CachedMetadataVersion::from_location(new_location))
                }
                Err(error) => {
                    tracing::info!(%status, %error, "commit did not complete");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        attempt: &mut Attempt,
        path: CommitPath,
        base: Option<&CachedMetadataVersion>,
        new_location: &str,
        cancel: &CancellationToken,
    ) -> CatalogResult<()> {
        attempt.local =
            Some(cancellable(cancel, "local_lock", self.throttle.acquire(&self.full_name)).await?);
        attempt.lock_id =
            Some(acquire_table_lock(self.locks.as_ref(), &self.table, &self.config, cancel).await?);

        let mut entry = match path {
            CommitPath::Update => {
                cancellable(cancel, "get_table", self.store.get_table(&self.table))
                    .await?
                    .map_err(|e| self.metastore_failure(e))?
                    .ok_or_else(|| CatalogError::NotFound {
                        table: self.table.to_string(),
                    })?
            }
            CommitPath::Create => {
                TableEntry::new_external(self.table.clone(), Some(self.config.lock_owner.clone()))
            }
        };

        let base_location = base.and_then(|b| b.metadata_location.as_deref());
        let current_location = entry.metadata_location();
        if current_location != base_location {
            metrics::record_conflict();
            return Err(CatalogError::commit_failed(format!(
                "Base metadata location '{}' is not the same as the current table metadata \
                 location '{}' for {}",
                base_location.unwrap_or("null"),
                current_location.unwrap_or("null"),
                self.table
            )));
        }

        entry.stamp(new_location, base_location);
        ensure_active(cancel, "apply")?;

        let cause = match self.apply(path, &entry, cancel).await {
            Ok(()) => {
                attempt.status = CommitStatus::Success;
                return Ok(());
            }
            Err(ApplyFailure::AlreadyExists) => {
                return Err(CatalogError::AlreadyExists {
                    table: self.table.to_string(),
                });
            }
            Err(ApplyFailure::Metastore(error)) => self.metastore_failure(error),
            Err(ApplyFailure::Cancelled) => CatalogError::Cancelled { operation: "apply" },
        };

        tracing::error!(
            error = %cause,
            "cannot tell if commit succeeded, checking the metastore"
        );
        attempt.status = self.check_commit_status(new_location).await;
        match attempt.status {
            CommitStatus::Success => {
                tracing::warn!(%new_location, "commit applied despite the failed call");
                Ok(())
            }
            CommitStatus::Failure => Err(cause),
            CommitStatus::Unknown => Err(CatalogError::CommitStateUnknown {
                table: self.full_name.clone(),
                source: Box::new(cause),
            }),
        }
    }

    async fn apply(
        &self,
        path: CommitPath,
        entry: &TableEntry,
        cancel: &CancellationToken,
    ) -> Result<(), ApplyFailure> {
        let call = async {
            match path {
                CommitPath::Create => self.store.create_table(entry).await,
                CommitPath::Update => {
                    self.store
                        .alter_table(&self.table, entry, UpdateOptions::pointer_commit())
                        .await
                }
            }
        };

        match cancellable(cancel, "apply", call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(MetastoreError::AlreadyExists(_))) if path == CommitPath::Create => {
                Err(ApplyFailure::AlreadyExists)
            }
            Ok(Err(error)) => Err(ApplyFailure::Metastore(error)),
            Err(_) => Err(ApplyFailure::Cancelled),
        }
    }

    /// Decides whether an ambiguous apply took effect.
    ///
    /// The read is not raced against cancellation: by the time it runs the
    /// caller needs an answer more than a prompt return.
    async fn check_commit_status(&self, new_location: &str) -> CommitStatus {
        match self.store.get_table(&self.table).await {
            Ok(Some(entry)) => {
                let current = entry.metadata_location();
                let previous = entry.previous_metadata_location();
                if current == Some(new_location) || previous == Some(new_location) {
                    tracing::info!(
                        %new_location,
                        "commit status check: new location is current or has been built upon"
                    );
                    CommitStatus::Success
                } else {
                    tracing::warn!(
                        %new_location,
                        current = current.unwrap_or("null"),
                        "commit status check: new location is not referenced"
                    );
                    CommitStatus::Failure
                }
            }
            Ok(None) => {
                tracing::warn!(%new_location, "commit status check: table entry is missing");
                CommitStatus::Failure
            }
            Err(error) => {
                tracing::error!(
                    %new_location,
                    %error,
                    "cannot check commit status, outcome is unknown"
                );
                CommitStatus::Unknown
            }
        }
    }

    /// Releases everything the attempt holds.
    ///
    /// FAILURE always comes with the error returned to the caller, so a failed
    /// delete is only logged and leaves an orphaned file behind.
    async fn cleanup(&self, attempt: Attempt, new_location: &str) {
        if attempt.status == CommitStatus::Failure {
            if let Err(error) = self.writer.delete_file(new_location).await {
                tracing::error!(
                    %new_location,
                    %error,
                    "failed to delete uncommitted metadata file"
                );
            }
        }
        if let Some(lock_id) = attempt.lock_id {
            release_lock(self.locks.as_ref(), &self.table, lock_id).await;
        }
        drop(attempt.local);
    }

    fn metastore_failure(&self, error: MetastoreError) -> CatalogError {
        CatalogError::communication(format!("Metastore operation failed for {}", self.table), error)
    }
}
