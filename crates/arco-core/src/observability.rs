//! Observability infrastructure for Arco.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors so that every metastore
//! commit and lock wait carries the same fields.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `arco_hive=debug`)
///
/// # Example
///
/// ```rust
/// use arco_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .try_init();
            }
            LogFormat::Pretty => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .try_init();
            }
        }
    });
}

/// Creates a span for a metastore commit attempt.
///
/// # Example
///
/// ```rust
/// use arco_core::observability::commit_span;
///
/// let span = commit_span("hive.db.events", "update");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn commit_span(table: &str, path: &str) -> Span {
    tracing::info_span!("metastore_commit", table = table, path = path)
}

/// Creates a span for a metastore refresh.
#[must_use]
pub fn refresh_span(table: &str) -> Span {
    tracing::info_span!("metastore_refresh", table = table)
}

/// Creates a span for waiting on an external lock.
#[must_use]
pub fn lock_span(table: &str, lock_id: i64) -> Span {
    tracing::debug_span!("metastore_lock", table = table, lock_id = lock_id)
}
