//! Pre-built fixtures for commit protocol tests.

use std::sync::Arc;
use std::time::Duration;

use arco_hive::metastore::LockService;
use arco_hive::pointer::{TableEntry, TableIdent};
use arco_hive::{CommitConfig, HiveCatalog};

use crate::metastore::FaultyPointerStore;
use crate::writer::RecordingMetadataWriter;

/// Catalog name used by fixtures.
pub const TEST_CATALOG: &str = "hive";

/// The table most tests commit to.
#[must_use]
pub fn test_table() -> TableIdent {
    TableIdent::new("db", "events")
}

/// Commit config with short timeouts and a fixed owner.
#[must_use]
pub fn fast_config() -> CommitConfig {
    CommitConfig::default()
        .with_lock_acquire_timeout(Duration::from_millis(500))
        .with_check_lock_timeout(Duration::from_millis(100))
        .with_lock_owner("test-writer")
}

/// An Iceberg entry for `ident` pointing at `location`.
#[must_use]
pub fn iceberg_entry(ident: &TableIdent, location: &str) -> TableEntry {
    let mut entry = TableEntry::new_external(ident.clone(), Some("fixture".to_string()));
    entry.stamp(location, None);
    entry
}

/// Doubles wired into one catalog.
pub struct TestCatalog<L> {
    /// Fault-injecting metastore.
    pub store: FaultyPointerStore,
    /// Lock service double.
    pub locks: L,
    /// Recording metadata writer.
    pub writer: RecordingMetadataWriter,
    /// Catalog over the doubles.
    pub catalog: HiveCatalog<RecordingMetadataWriter>,
}

impl<L: LockService + Clone + 'static> TestCatalog<L> {
    /// Builds a catalog over fresh store and writer doubles and `locks`.
    pub fn new(locks: L, config: CommitConfig) -> Self {
        let store = FaultyPointerStore::new();
        let writer = RecordingMetadataWriter::new("s3://warehouse/db/events");
        let catalog = HiveCatalog::new(
            TEST_CATALOG,
            Arc::new(store.clone()),
            Arc::new(locks.clone()),
            Arc::new(writer.clone()),
            config,
        );
        Self {
            store,
            locks,
            writer,
            catalog,
        }
    }
}
