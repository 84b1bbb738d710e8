//! Error types for metastore commit operations.
//!
//! The taxonomy separates outcomes a caller may retry after a fresh refresh
//! ([`CatalogError::CommitFailed`]) from outcomes that need out-of-band
//! verification first ([`CatalogError::CommitStateUnknown`]).

use thiserror::Error;

use crate::metastore::MetastoreError;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors surfaced by refresh and commit.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The table entry disappeared after a version had been cached.
    #[error("No such table: {table}")]
    NotFound {
        /// Fully qualified table name.
        table: String,
    },

    /// The entry exists but is not an Iceberg table pointer.
    #[error("Not an iceberg table: {message}")]
    NotRecognized {
        /// What made the entry unrecognizable.
        message: String,
    },

    /// A create collided with an existing entry.
    #[error("Table already exists: {table}")]
    AlreadyExists {
        /// Fully qualified table name.
        table: String,
    },

    /// The commit was not applied. Safe to retry after a refresh.
    #[error("Commit failed: {message}")]
    CommitFailed {
        /// Why the commit was rejected (CAS conflict, lock timeout, lock denial).
        message: String,
    },

    /// The commit may or may not have been applied.
    ///
    /// Never retry blindly: the pointer must be inspected out of band first.
    #[error("Commit state unknown for {table}: {source}")]
    CommitStateUnknown {
        /// Fully qualified table name.
        table: String,
        /// The failure that made the outcome ambiguous.
        #[source]
        source: Box<CatalogError>,
    },

    /// A metastore or lock service call failed at the transport level.
    #[error("{message}")]
    Communication {
        /// Context for the failed call.
        message: String,
        /// The client error.
        #[source]
        source: MetastoreError,
    },

    /// The new metadata file could not be written.
    #[error("Failed to write new metadata file for {table}")]
    MetadataWrite {
        /// Fully qualified table name.
        table: String,
        /// The underlying storage error.
        #[source]
        source: arco_core::Error,
    },

    /// The operation was cancelled through its cancellation token.
    #[error("Cancelled during {operation}")]
    Cancelled {
        /// The step that was interrupted.
        operation: &'static str,
    },

    /// Invalid configuration or other shared-primitive failure.
    #[error(transparent)]
    Core(#[from] arco_core::Error),
}

impl CatalogError {
    /// Creates a commit failure with the given message.
    #[must_use]
    pub fn commit_failed(message: impl Into<String>) -> Self {
        Self::CommitFailed {
            message: message.into(),
        }
    }

    /// Wraps a client error with call context.
    #[must_use]
    pub fn communication(message: impl Into<String>, source: MetastoreError) -> Self {
        Self::Communication {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` when the caller may refresh and retry the commit.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CommitFailed { .. })
    }

    /// Returns `true` when the persisted outcome is unknown.
    #[must_use]
    pub const fn is_commit_state_unknown(&self) -> bool {
        matches!(self, Self::CommitStateUnknown { .. })
    }

    /// Returns `true` for cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_only_commit_failed_is_retryable() {
        assert!(CatalogError::commit_failed("conflict").is_retryable());
        assert!(!CatalogError::AlreadyExists { table: "t".into() }.is_retryable());

        let unknown = CatalogError::CommitStateUnknown {
            table: "hive.db.t".into(),
            source: Box::new(CatalogError::Cancelled { operation: "apply" }),
        };
        assert!(!unknown.is_retryable());
        assert!(unknown.is_commit_state_unknown());
    }

    #[test]
    fn test_unknown_keeps_original_cause() {
        let cause = CatalogError::communication(
            "Metastore operation failed for db.t",
            MetastoreError::transport("connection reset"),
        );
        let unknown = CatalogError::CommitStateUnknown {
            table: "hive.db.t".into(),
            source: Box::new(cause),
        };
        let source = unknown.source().expect("source");
        assert!(source.to_string().contains("Metastore operation failed"));
        assert!(source.source().is_some());
    }
}
