//! Loading the current table pointer from the metastore.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cancel::cancellable;
use crate::error::{CatalogError, CatalogResult};
use crate::metastore::PointerStore;
use crate::pointer::{CachedMetadataVersion, PointerError, TableEntry, TableIdent};

/// Reads a table's pointer and turns it into a [`CachedMetadataVersion`].
#[derive(Clone)]
pub struct Refresher {
    store: Arc<dyn PointerStore>,
    table: TableIdent,
    full_name: String,
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("table", &self.table)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

impl Refresher {
    /// Creates a refresher for `table` registered in `catalog`.
    #[must_use]
    pub fn new(store: Arc<dyn PointerStore>, catalog: &str, table: TableIdent) -> Self {
        let full_name = table.full_name(catalog);
        Self {
            store,
            table,
            full_name,
        }
    }

    /// Loads the current pointer.
    ///
    /// `cached` is the caller's current view; it decides whether a missing
    /// entry means "not created yet" or "dropped underneath us". The caller
    /// keeps its cache untouched when this returns an error.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] when the entry vanished after a location was cached
    /// - [`CatalogError::NotRecognized`] when the entry is not an Iceberg pointer
    /// - [`CatalogError::Communication`] when the metastore call fails
    /// - [`CatalogError::Cancelled`] when `cancel` fires first
    pub async fn refresh(
        &self,
        cached: &CachedMetadataVersion,
        cancel: &CancellationToken,
    ) -> CatalogResult<CachedMetadataVersion> {
        let span = arco_core::observability::refresh_span(&self.full_name);
        async {
            let loaded = cancellable(cancel, "refresh", self.store.get_table(&self.table))
                .await?
                .map_err(|e| {
                    CatalogError::communication(
                        format!("Failed to get table info from metastore {}", self.table),
                        e,
                    )
                })?;

            let Some(entry) = loaded else {
                if cached.is_empty() {
                    tracing::debug!("table has no metastore entry yet");
                    return Ok(CachedMetadataVersion::empty());
                }
                return Err(CatalogError::NotFound {
                    table: self.table.to_string(),
                });
            };

            let location = self.validate(&entry)?;
            tracing::debug!(metadata_location = %location, "refreshed table pointer");
            Ok(CachedMetadataVersion::from_location(location))
        }
        .instrument(span)
        .await
    }

    fn validate(&self, entry: &TableEntry) -> CatalogResult<String> {
        match entry.pointer() {
            Ok(pointer) => Ok(pointer.metadata_location),
            Err(error @ PointerError::WrongKind { .. }) => Err(CatalogError::NotRecognized {
                message: format!("{} ({error})", self.full_name),
            }),
            Err(error @ PointerError::MissingMetadataLocation) => {
                Err(CatalogError::NotRecognized {
                    message: format!("{} {error}", self.full_name),
                })
            }
        }
    }
}
