//! # arco-core
//!
//! Core abstractions shared by the Arco metastore commit components.
//!
//! This crate provides the foundational pieces used across the workspace:
//!
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span constructors
//! - **Properties**: Strict typed parsing of string configuration sources
//!
//! ## Crate Boundary
//!
//! `arco-core` is the **only** crate allowed to define shared primitives.
//! Domain crates such as `arco-hive` build on these and never re-define them.
//!
//! ## Example
//!
//! ```rust
//! use arco_core::prelude::*;
//!
//! init_logging(LogFormat::Pretty);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod observability;
pub mod properties;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::observability::{LogFormat, init_logging};
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use observability::{LogFormat, init_logging};
