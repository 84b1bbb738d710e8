//! Client contracts for the external services a commit depends on.
//!
//! - [`PointerStore`]: the metastore holding one [`TableEntry`] per table
//! - [`LockService`]: exclusive table-level locks with polling
//! - [`MetadataWriter`]: writes and deletes versioned metadata files
//!
//! None of these are implemented here beyond the in-memory versions in
//! [`crate::memory`]; production deployments plug in their own clients.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pointer::{TableEntry, TableIdent};

/// Errors returned by metastore and lock service clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetastoreError {
    /// A create targeted a key that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The referenced object (table, lock id) does not exist.
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// The call failed in transit; the server-side effect is unknown.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The call did not complete in time; the server-side effect is unknown.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// The call that timed out.
        operation: String,
        /// How long the client waited.
        elapsed: Duration,
    },
}

impl MetastoreError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Result type for client calls.
pub type MetastoreResult<T> = Result<T, MetastoreError>;

/// Options for [`PointerStore::alter_table`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Ask the metastore not to recompute table statistics on this update.
    pub skip_statistics: bool,
}

impl UpdateOptions {
    /// Options used by pointer commits: statistics bookkeeping is skipped.
    #[must_use]
    pub const fn pointer_commit() -> Self {
        Self {
            skip_statistics: true,
        }
    }
}

/// Metastore operations needed to read and move a table pointer.
#[async_trait]
pub trait PointerStore: Send + Sync {
    /// Loads a table entry, `None` if it does not exist.
    async fn get_table(&self, ident: &TableIdent) -> MetastoreResult<Option<TableEntry>>;

    /// Creates a new table entry.
    ///
    /// Returns [`MetastoreError::AlreadyExists`] when the key is taken.
    async fn create_table(&self, entry: &TableEntry) -> MetastoreResult<()>;

    /// Replaces an existing table entry.
    async fn alter_table(
        &self,
        ident: &TableIdent,
        entry: &TableEntry,
        options: UpdateOptions,
    ) -> MetastoreResult<()>;
}

/// State of an external lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    /// Queued behind another holder.
    Waiting,
    /// Held by the requester.
    Acquired,
    /// Refused by the lock service.
    Denied,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "WAITING",
            Self::Acquired => "ACQUIRED",
            Self::Denied => "DENIED",
        };
        f.write_str(name)
    }
}

/// An exclusive table-level lock request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// The table to lock.
    pub resource: TableIdent,
    /// Holder identity reported to the lock service.
    pub owner: String,
}

impl LockRequest {
    /// Creates an exclusive lock request for `resource`.
    #[must_use]
    pub fn exclusive(resource: TableIdent, owner: impl Into<String>) -> Self {
        Self {
            resource,
            owner: owner.into(),
        }
    }
}

/// Lock service reply to a request or a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResponse {
    /// Lock id, stable for the lifetime of the request.
    pub lock_id: i64,
    /// Current state.
    pub state: LockState,
}

/// External exclusive lock service.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Requests a lock; it may be granted immediately or queued.
    async fn lock(&self, request: &LockRequest) -> MetastoreResult<LockResponse>;

    /// Polls the state of a lock.
    async fn check_lock(&self, lock_id: i64) -> MetastoreResult<LockResponse>;

    /// Releases a granted lock or withdraws a queued request.
    async fn unlock(&self, lock_id: i64) -> MetastoreResult<()>;
}

/// Writes versioned metadata files and removes orphaned ones.
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    /// The table metadata this writer encodes.
    type Metadata: Send + Sync;

    /// Writes `metadata` as version `version` and returns its location.
    async fn write_new_version(
        &self,
        metadata: &Self::Metadata,
        version: i64,
    ) -> arco_core::Result<String>;

    /// Deletes the file at `location`.
    async fn delete_file(&self, location: &str) -> arco_core::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_state_display_and_serde() {
        assert_eq!(LockState::Waiting.to_string(), "WAITING");
        assert_eq!(
            serde_json::to_string(&LockState::Acquired).expect("serialize"),
            "\"ACQUIRED\""
        );
    }

    #[test]
    fn test_pointer_commit_skips_statistics() {
        assert!(UpdateOptions::pointer_commit().skip_statistics);
        assert!(!UpdateOptions::default().skip_statistics);
    }

    #[test]
    fn test_timeout_display() {
        let err = MetastoreError::Timeout {
            operation: "alter_table".into(),
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "alter_table timed out after 2s");
    }
}
