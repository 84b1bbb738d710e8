//! Shared test utilities for Arco integration tests.
//!
//! This crate provides:
//! - [`ScriptedLockService`]: lock service replaying scripted states
//! - [`FaultyPointerStore`]: in-memory metastore with injectable failures
//! - [`RecordingMetadataWriter`]: metadata writer with a write/delete journal
//! - [`TestCatalog`] and fixture helpers wiring the doubles together
//!
//! # Example
//!
//! ```rust,ignore
//! use arco_test_utils::{ScriptedLockService, TestCatalog, fast_config, test_table};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestCatalog::new(ScriptedLockService::granting(), fast_config());
//!     let mut ops = ctx.catalog.table_operations(test_table());
//!     // ... commit and assert on ctx.store / ctx.locks / ctx.writer ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod locks;
pub mod metastore;
pub mod writer;

pub use fixtures::*;
pub use locks::*;
pub use metastore::*;
pub use writer::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("arco_hive=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
