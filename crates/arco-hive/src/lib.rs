//! # arco-hive
//!
//! Metadata pointer commits against a Hive-style metastore.
//!
//! Each table is a metastore entry whose parameters point at the table's
//! current metadata file. Many writers race to move that pointer; this crate
//! makes sure exactly one wins per base version and that every writer can tell
//! whether its attempt took effect:
//!
//! - **Refresh**: load and validate the pointer, caching its location and version
//! - **Local throttle**: a fair per-table mutex so one process queues commits
//!   before touching the lock service
//! - **External lock**: an exclusive table lock polled until granted, timed out
//!   or denied
//! - **CAS commit**: re-read under the lock, compare against the base, apply
//! - **Reconciliation**: after an ambiguous apply failure, re-read the pointer
//!   to classify the attempt as SUCCESS, FAILURE or UNKNOWN
//!
//! ## Error Model
//!
//! | Error | Meaning | Caller action |
//! |-------|---------|---------------|
//! | `CommitFailed` | Not applied (stale base, lock timeout/denial) | Refresh and retry |
//! | `CommitStateUnknown` | Outcome could not be determined | Inspect out of band, never retry blindly |
//! | `AlreadyExists` | Create collided with an existing entry | Load the table instead |
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use arco_hive::prelude::*;
//! use arco_hive::memory::{MemoryLockService, MemoryMetadataWriter, MemoryPointerStore};
//!
//! let catalog = HiveCatalog::new(
//!     "hive",
//!     Arc::new(MemoryPointerStore::new()),
//!     Arc::new(MemoryLockService::new()),
//!     Arc::new(MemoryMetadataWriter::new("s3://warehouse/db/events")),
//!     CommitConfig::from_env()?,
//! );
//!
//! let mut ops = catalog.table_operations(TableIdent::new("db", "events"));
//! ops.refresh().await?;
//! ops.commit(ops.current_base(), &serde_json::json!({"format-version": 2})).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod catalog;
pub mod commit;
pub mod config;
pub mod error;
pub mod lock;
pub mod memory;
pub mod metastore;
pub mod metrics;
pub mod pointer;
pub mod refresh;
pub mod rewrite_group;
pub mod table;
pub mod throttle;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::HiveCatalog;
    pub use crate::commit::{CommitCoordinator, CommitPath, CommitStatus};
    pub use crate::config::CommitConfig;
    pub use crate::error::{CatalogError, CatalogResult};
    pub use crate::metastore::{
        LockRequest, LockResponse, LockService, LockState, MetadataWriter, MetastoreError,
        MetastoreResult, PointerStore, UpdateOptions,
    };
    pub use crate::pointer::{CachedMetadataVersion, TableEntry, TableIdent, TablePointer};
    pub use crate::table::TableOperations;
    pub use crate::throttle::LocalCommitThrottle;
}

// Re-export key types at crate root
pub use catalog::HiveCatalog;
pub use commit::{CommitCoordinator, CommitStatus};
pub use config::CommitConfig;
pub use error::{CatalogError, CatalogResult};
pub use pointer::{CachedMetadataVersion, TableIdent};
pub use refresh::Refresher;
pub use table::TableOperations;
pub use throttle::LocalCommitThrottle;
