//! In-memory metastore, lock service and metadata writer.
//!
//! Thread-safe via `RwLock`/`Mutex`. Not suitable for production: nothing is
//! persisted and there is no network boundary, so no call is ever ambiguous.
//! Used for local runs and as the base of the fault-injecting test doubles.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use crate::metastore::{
    LockRequest, LockResponse, LockService, LockState, MetadataWriter, MetastoreError,
    MetastoreResult, PointerStore, UpdateOptions,
};
use crate::pointer::{TableEntry, TableIdent, metadata_file_name};

fn poisoned() -> MetastoreError {
    MetastoreError::transport("lock poisoned")
}

// ============================================================================
// MemoryPointerStore
// ============================================================================

/// In-memory [`PointerStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryPointerStore {
    tables: Arc<RwLock<BTreeMap<TableIdent, TableEntry>>>,
}

impl MemoryPointerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored entry, bypassing the async client API.
    #[must_use]
    pub fn snapshot(&self, ident: &TableIdent) -> Option<TableEntry> {
        self.tables.read().ok()?.get(ident).cloned()
    }

    /// Inserts or replaces an entry directly (fixture setup).
    pub fn put(&self, entry: TableEntry) {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(entry.ident.clone(), entry);
        }
    }

    /// Removes an entry directly, as a drop by another client would.
    pub fn remove(&self, ident: &TableIdent) -> Option<TableEntry> {
        self.tables.write().ok()?.remove(ident)
    }
}

#[async_trait]
impl PointerStore for MemoryPointerStore {
    async fn get_table(&self, ident: &TableIdent) -> MetastoreResult<Option<TableEntry>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.get(ident).cloned())
    }

    async fn create_table(&self, entry: &TableEntry) -> MetastoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if tables.contains_key(&entry.ident) {
            return Err(MetastoreError::AlreadyExists(entry.ident.to_string()));
        }
        tables.insert(entry.ident.clone(), entry.clone());
        Ok(())
    }

    async fn alter_table(
        &self,
        ident: &TableIdent,
        entry: &TableEntry,
        _options: UpdateOptions,
    ) -> MetastoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let Some(existing) = tables.get_mut(ident) else {
            return Err(MetastoreError::NoSuchObject(ident.to_string()));
        };
        *existing = entry.clone();
        Ok(())
    }
}

// ============================================================================
// MemoryLockService
// ============================================================================

#[derive(Debug, Default)]
struct LockTable {
    next_id: i64,
    states: HashMap<i64, (TableIdent, LockState)>,
    holders: HashMap<TableIdent, i64>,
    queues: HashMap<TableIdent, VecDeque<i64>>,
}

impl LockTable {
    fn response(&self, lock_id: i64) -> MetastoreResult<LockResponse> {
        self.states
            .get(&lock_id)
            .map(|(_, state)| LockResponse {
                lock_id,
                state: *state,
            })
            .ok_or_else(|| MetastoreError::NoSuchObject(format!("lock {lock_id}")))
    }

    fn grant_next(&mut self, resource: &TableIdent) {
        let next = self
            .queues
            .get_mut(resource)
            .and_then(VecDeque::pop_front);
        match next {
            Some(lock_id) => {
                self.holders.insert(resource.clone(), lock_id);
                if let Some(entry) = self.states.get_mut(&lock_id) {
                    entry.1 = LockState::Acquired;
                }
            }
            None => {
                self.holders.remove(resource);
                self.queues.remove(resource);
            }
        }
    }
}

/// In-memory [`LockService`] granting one exclusive lock per table.
///
/// Requests against a held table queue in arrival order and are granted when
/// the holder unlocks.
#[derive(Debug, Default, Clone)]
pub struct MemoryLockService {
    table: Arc<Mutex<LockTable>>,
}

impl MemoryLockService {
    /// Creates a lock service with no locks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock id currently holding `resource`, if any.
    #[must_use]
    pub fn holder(&self, resource: &TableIdent) -> Option<i64> {
        self.table.lock().ok()?.holders.get(resource).copied()
    }

    /// Returns the number of live lock ids (held or queued).
    #[must_use]
    pub fn live_locks(&self) -> usize {
        self.table.lock().map(|t| t.states.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn lock(&self, request: &LockRequest) -> MetastoreResult<LockResponse> {
        let mut table = self.table.lock().map_err(|_| poisoned())?;
        table.next_id += 1;
        let lock_id = table.next_id;
        let resource = request.resource.clone();

        let state = if table.holders.contains_key(&resource) {
            table
                .queues
                .entry(resource.clone())
                .or_default()
                .push_back(lock_id);
            LockState::Waiting
        } else {
            table.holders.insert(resource.clone(), lock_id);
            LockState::Acquired
        };
        table.states.insert(lock_id, (resource, state));
        Ok(LockResponse { lock_id, state })
    }

    async fn check_lock(&self, lock_id: i64) -> MetastoreResult<LockResponse> {
        let table = self.table.lock().map_err(|_| poisoned())?;
        table.response(lock_id)
    }

    async fn unlock(&self, lock_id: i64) -> MetastoreResult<()> {
        let mut table = self.table.lock().map_err(|_| poisoned())?;
        let Some((resource, state)) = table.states.remove(&lock_id) else {
            return Err(MetastoreError::NoSuchObject(format!("lock {lock_id}")));
        };
        match state {
            LockState::Acquired => table.grant_next(&resource),
            LockState::Waiting | LockState::Denied => {
                if let Some(queue) = table.queues.get_mut(&resource) {
                    queue.retain(|id| *id != lock_id);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// MemoryMetadataWriter
// ============================================================================

/// In-memory [`MetadataWriter`] storing metadata documents as JSON.
///
/// Files are named `{table_location}/metadata/{version:05}-{uuid}.metadata.json`.
#[derive(Debug, Clone)]
pub struct MemoryMetadataWriter {
    table_location: String,
    files: Arc<DashMap<String, Bytes>>,
}

impl MemoryMetadataWriter {
    /// Creates a writer rooted at `table_location`.
    #[must_use]
    pub fn new(table_location: impl Into<String>) -> Self {
        Self {
            table_location: table_location.into().trim_end_matches('/').to_string(),
            files: Arc::new(DashMap::new()),
        }
    }

    /// Returns `true` when a file exists at `location`.
    #[must_use]
    pub fn exists(&self, location: &str) -> bool {
        self.files.contains_key(location)
    }

    /// Returns the stored bytes for `location`.
    #[must_use]
    pub fn read(&self, location: &str) -> Option<Bytes> {
        self.files.get(location).map(|file| file.value().clone())
    }

    /// Returns all stored locations, sorted.
    #[must_use]
    pub fn locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.files.iter().map(|f| f.key().clone()).collect();
        locations.sort();
        locations
    }
}

#[async_trait]
impl MetadataWriter for MemoryMetadataWriter {
    type Metadata = serde_json::Value;

    async fn write_new_version(
        &self,
        metadata: &Self::Metadata,
        version: i64,
    ) -> arco_core::Result<String> {
        let payload = serde_json::to_vec(metadata).map_err(|e| {
            arco_core::Error::serialization_with_source("encode table metadata", e)
        })?;
        let location = format!(
            "{}/metadata/{}",
            self.table_location,
            metadata_file_name(version, &Uuid::new_v4())
        );
        self.files.insert(location.clone(), Bytes::from(payload));
        Ok(location)
    }

    async fn delete_file(&self, location: &str) -> arco_core::Result<()> {
        self.files.remove(location);
        Ok(())
    }
}
