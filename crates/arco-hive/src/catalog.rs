//! Catalog session tying the metastore clients to per-table operations.

use std::fmt;
use std::sync::Arc;

use crate::commit::CommitCoordinator;
use crate::config::CommitConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::metastore::{LockService, MetadataWriter, PointerStore};
use crate::pointer::TableIdent;
use crate::refresh::Refresher;
use crate::table::TableOperations;
use crate::throttle::LocalCommitThrottle;

/// A named catalog backed by a Hive-style metastore.
///
/// Every [`TableOperations`] handed out by one catalog shares the same
/// [`LocalCommitThrottle`], so commits to one table from this process queue
/// locally before contending for the external lock.
pub struct HiveCatalog<W: MetadataWriter> {
    name: String,
    store: Arc<dyn PointerStore>,
    locks: Arc<dyn LockService>,
    writer: Arc<W>,
    config: CommitConfig,
    throttle: Arc<LocalCommitThrottle>,
}

impl<W: MetadataWriter> fmt::Debug for HiveCatalog<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HiveCatalog")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl<W: MetadataWriter> HiveCatalog<W> {
    /// Creates a catalog with its own local commit throttle.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn PointerStore>,
        locks: Arc<dyn LockService>,
        writer: Arc<W>,
        config: CommitConfig,
    ) -> Self {
        crate::metrics::register_metrics();
        let throttle = Arc::new(LocalCommitThrottle::new(config.table_level_lock_evict));
        Self {
            name: name.into(),
            store,
            locks,
            writer,
            config,
            throttle,
        }
    }

    /// Replaces the local throttle, e.g. to share one across catalogs that
    /// point at the same metastore.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Arc<LocalCommitThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Catalog name, the first component of every table's full name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Commit configuration.
    #[must_use]
    pub fn config(&self) -> &CommitConfig {
        &self.config
    }

    /// The local commit throttle shared by this catalog's tables.
    #[must_use]
    pub fn throttle(&self) -> &Arc<LocalCommitThrottle> {
        &self.throttle
    }

    /// Returns operations for `ident` with an empty cache.
    ///
    /// Nothing is read from the metastore; call
    /// [`TableOperations::refresh`] before committing to an existing table.
    #[must_use]
    pub fn table_operations(&self, ident: TableIdent) -> TableOperations<W> {
        let refresher = Refresher::new(Arc::clone(&self.store), &self.name, ident.clone());
        let coordinator = CommitCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            Arc::clone(&self.writer),
            Arc::clone(&self.throttle),
            self.config.clone(),
            &self.name,
            ident.clone(),
        );
        TableOperations::new(ident, refresher, coordinator)
    }

    /// Returns refreshed operations for an existing table.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when the table has no entry, or any
    /// refresh error.
    pub async fn load_table(&self, ident: TableIdent) -> CatalogResult<TableOperations<W>> {
        let mut ops = self.table_operations(ident);
        if ops.refresh().await?.is_empty() {
            return Err(CatalogError::NotFound {
                table: ops.ident().to_string(),
            });
        }
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLockService, MemoryMetadataWriter, MemoryPointerStore};
    use serde_json::json;
    use std::time::Duration;

    fn catalog() -> HiveCatalog<MemoryMetadataWriter> {
        HiveCatalog::new(
            "hive",
            Arc::new(MemoryPointerStore::new()),
            Arc::new(MemoryLockService::new()),
            Arc::new(MemoryMetadataWriter::new("s3://wh")),
            CommitConfig::default(),
        )
    }

    #[test]
    fn test_throttle_uses_configured_idle_timeout() {
        let config = CommitConfig::default().with_table_level_lock_evict(Duration::from_secs(30));
        let catalog = HiveCatalog::new(
            "hive",
            Arc::new(MemoryPointerStore::new()),
            Arc::new(MemoryLockService::new()),
            Arc::new(MemoryMetadataWriter::new("s3://wh")),
            config,
        );
        assert_eq!(catalog.throttle().idle_timeout(), Duration::from_secs(30));

        let shared = Arc::new(LocalCommitThrottle::new(Duration::from_secs(5)));
        let catalog = catalog.with_throttle(Arc::clone(&shared));
        assert!(Arc::ptr_eq(catalog.throttle(), &shared));
        assert_eq!(catalog.throttle().idle_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_load_missing_table_is_not_found() {
        let err = catalog()
            .load_table(TableIdent::new("db", "t"))
            .await
            .expect_err("missing");
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_tables_share_catalog_state() {
        let catalog = catalog();
        let ident = TableIdent::new("db", "t");

        let mut writer = catalog.table_operations(ident.clone());
        assert!(writer.current_base().is_none());
        let created = writer
            .commit(None, &json!({"schema": []}))
            .await
            .expect("create")
            .clone();

        let reader = catalog.load_table(ident).await.expect("load");
        assert_eq!(reader.current(), &created);
        assert_eq!(reader.current_base(), Some(created));
        assert_eq!(catalog.throttle().len(), 1);
    }
}
