//! Metadata writer that records writes and deletes.

use std::sync::{Arc, Mutex};

use arco_core::{Error, Result};
use arco_hive::memory::MemoryMetadataWriter;
use arco_hive::metastore::MetadataWriter;
use async_trait::async_trait;

#[derive(Debug, Default)]
struct Journal {
    written: Vec<String>,
    deleted: Vec<String>,
    fail_writes: bool,
    fail_deletes: bool,
}

/// [`MetadataWriter`] over [`MemoryMetadataWriter`] with a call journal.
#[derive(Debug, Clone)]
pub struct RecordingMetadataWriter {
    inner: MemoryMetadataWriter,
    journal: Arc<Mutex<Journal>>,
}

impl RecordingMetadataWriter {
    /// Creates a writer rooted at `table_location`.
    #[must_use]
    pub fn new(table_location: impl Into<String>) -> Self {
        Self {
            inner: MemoryMetadataWriter::new(table_location),
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    /// Makes every write fail.
    pub fn fail_writes(&self) {
        self.journal.lock().expect("lock").fail_writes = true;
    }

    /// Makes every delete fail (the attempt is still recorded).
    pub fn fail_deletes(&self) {
        self.journal.lock().expect("lock").fail_deletes = true;
    }

    /// Locations written, in order.
    pub fn written(&self) -> Vec<String> {
        self.journal.lock().expect("lock").written.clone()
    }

    /// Locations passed to `delete_file`, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.journal.lock().expect("lock").deleted.clone()
    }

    /// Returns `true` when a file is currently stored at `location`.
    pub fn exists(&self, location: &str) -> bool {
        self.inner.exists(location)
    }

    /// All stored locations, sorted.
    pub fn locations(&self) -> Vec<String> {
        self.inner.locations()
    }
}

#[async_trait]
impl MetadataWriter for RecordingMetadataWriter {
    type Metadata = serde_json::Value;

    async fn write_new_version(&self, metadata: &Self::Metadata, version: i64) -> Result<String> {
        if self.journal.lock().expect("lock").fail_writes {
            return Err(Error::storage("metadata write failed by test"));
        }
        let location = self.inner.write_new_version(metadata, version).await?;
        self.journal
            .lock()
            .expect("lock")
            .written
            .push(location.clone());
        Ok(location)
    }

    async fn delete_file(&self, location: &str) -> Result<()> {
        let fail = {
            let mut journal = self.journal.lock().expect("lock");
            journal.deleted.push(location.to_string());
            journal.fail_deletes
        };
        if fail {
            return Err(Error::storage(format!("delete of {location} failed by test")));
        }
        self.inner.delete_file(location).await
    }
}
