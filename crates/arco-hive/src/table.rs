//! Per-table handle combining refresh, commit and the cached pointer.

use tokio_util::sync::CancellationToken;

use crate::commit::CommitCoordinator;
use crate::error::CatalogResult;
use crate::metastore::MetadataWriter;
use crate::pointer::{CachedMetadataVersion, TableIdent};
use crate::refresh::Refresher;

/// Operations on one table, owning its cached metadata version.
///
/// The cache only changes after a successful refresh or commit; a failed or
/// cancelled call leaves it as it was.
#[derive(Debug)]
pub struct TableOperations<W: MetadataWriter> {
    ident: TableIdent,
    refresher: Refresher,
    coordinator: CommitCoordinator<W>,
    current: CachedMetadataVersion,
}

impl<W: MetadataWriter> TableOperations<W> {
    pub(crate) fn new(
        ident: TableIdent,
        refresher: Refresher,
        coordinator: CommitCoordinator<W>,
    ) -> Self {
        Self {
            ident,
            refresher,
            coordinator,
            current: CachedMetadataVersion::empty(),
        }
    }

    /// The table these operations act on.
    #[must_use]
    pub fn ident(&self) -> &TableIdent {
        &self.ident
    }

    /// The cached metadata version.
    #[must_use]
    pub fn current(&self) -> &CachedMetadataVersion {
        &self.current
    }

    /// The base to pass to [`Self::commit`] for a commit on top of the cache:
    /// `None` while the table does not exist.
    #[must_use]
    pub fn current_base(&self) -> Option<CachedMetadataVersion> {
        (!self.current.is_empty()).then(|| self.current.clone())
    }

    /// Reloads the pointer from the metastore.
    ///
    /// # Errors
    ///
    /// See [`Refresher::refresh`].
    pub async fn refresh(&mut self) -> CatalogResult<&CachedMetadataVersion> {
        self.refresh_with_cancellation(&CancellationToken::new())
            .await
    }

    /// Reloads the pointer, giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`Refresher::refresh`].
    pub async fn refresh_with_cancellation(
        &mut self,
        cancel: &CancellationToken,
    ) -> CatalogResult<&CachedMetadataVersion> {
        self.current = self.refresher.refresh(&self.current, cancel).await?;
        Ok(&self.current)
    }

    /// Commits `metadata` on top of `base` (`None` to create the table).
    ///
    /// # Errors
    ///
    /// See [`CommitCoordinator::commit`].
    pub async fn commit(
        &mut self,
        base: Option<CachedMetadataVersion>,
        metadata: &W::Metadata,
    ) -> CatalogResult<&CachedMetadataVersion> {
        self.commit_with_cancellation(base, metadata, &CancellationToken::new())
            .await
    }

    /// Commits `metadata` on top of `base`, giving up when `cancel` fires.
    ///
    /// Cancellation while the apply call is in flight is reconciled like any
    /// other ambiguous failure before this returns.
    ///
    /// # Errors
    ///
    /// See [`CommitCoordinator::commit`].
    pub async fn commit_with_cancellation(
        &mut self,
        base: Option<CachedMetadataVersion>,
        metadata: &W::Metadata,
        cancel: &CancellationToken,
    ) -> CatalogResult<&CachedMetadataVersion> {
        self.current = self
            .coordinator
            .commit(base.as_ref(), metadata, cancel)
            .await?;
        Ok(&self.current)
    }
}
