//! Metrics for metastore commits and lock waits.
//!
//! Recorded through the `metrics` facade; installing a recorder/exporter is
//! left to the host process.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Commit attempts by final status (`success`, `failure`, `unknown`).
pub const HIVE_COMMIT_TOTAL: &str = "hive_commit_total";

/// Commits rejected because the base metadata location was stale.
pub const HIVE_COMMIT_CONFLICT_TOTAL: &str = "hive_commit_conflict_total";

/// Failed external lock acquisitions by reason (`timeout`, `state`, `cancelled`).
pub const HIVE_LOCK_ACQUIRE_FAILURE_TOTAL: &str = "hive_lock_acquire_failure_total";

/// Time spent waiting for the external lock, in seconds.
pub const HIVE_LOCK_WAIT_SECONDS: &str = "hive_lock_wait_seconds";

static METRICS_REGISTERED: OnceLock<()> = OnceLock::new();

/// Registers metric descriptions.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn register_metrics() {
    METRICS_REGISTERED.get_or_init(|| {
        describe_counter!(
            HIVE_COMMIT_TOTAL,
            "Total number of metastore commit attempts by status"
        );
        describe_counter!(
            HIVE_COMMIT_CONFLICT_TOTAL,
            "Total number of metastore commits rejected by the CAS check"
        );
        describe_counter!(
            HIVE_LOCK_ACQUIRE_FAILURE_TOTAL,
            "Total number of failed external lock acquisitions by reason"
        );
        describe_histogram!(
            HIVE_LOCK_WAIT_SECONDS,
            "Time spent waiting for the external table lock in seconds"
        );
    });
}

pub(crate) fn record_commit(status: &'static str) {
    counter!(HIVE_COMMIT_TOTAL, "status" => status).increment(1);
}

pub(crate) fn record_conflict() {
    counter!(HIVE_COMMIT_CONFLICT_TOTAL).increment(1);
}

pub(crate) fn record_lock_failure(reason: &'static str) {
    counter!(HIVE_LOCK_ACQUIRE_FAILURE_TOTAL, "reason" => reason).increment(1);
}

pub(crate) fn record_lock_wait(waited: Duration) {
    histogram!(HIVE_LOCK_WAIT_SECONDS).record(waited.as_secs_f64());
}
