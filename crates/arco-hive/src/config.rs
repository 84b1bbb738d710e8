//! Commit protocol configuration.

use std::collections::HashMap;
use std::time::Duration;

use arco_core::Result;
use arco_core::properties::{non_empty_string, parse_positive_u64};
use ulid::Ulid;

/// Property: total time to wait for the external lock, in milliseconds.
pub const LOCK_ACQUIRE_TIMEOUT_MS: &str = "iceberg.hive.lock-timeout-ms";
/// Property: longest acceptable single lock status call, in milliseconds.
pub const LOCK_CHECK_TIMEOUT_MS: &str = "iceberg.hive.check-lock-timeout-ms";
/// Property: idle time before a local commit mutex may be evicted, in milliseconds.
pub const TABLE_LEVEL_LOCK_EVICT_MS: &str = "iceberg.hive.table-level-lock-evict-ms";
/// Property: owner reported with lock requests and new table entries.
pub const LOCK_OWNER: &str = "iceberg.hive.lock-owner";

const LOCK_ACQUIRE_TIMEOUT_ALIAS: &str = "lock-acquire-timeout-ms";
const LOCK_CHECK_TIMEOUT_ALIAS: &str = "lock-check-timeout-ms";
const TABLE_LEVEL_LOCK_EVICT_ALIAS: &str = "table-level-lock-evict-ms";

/// Environment variable overriding the lock acquisition timeout.
pub const ENV_LOCK_ACQUIRE_TIMEOUT_MS: &str = "ARCO_HIVE_LOCK_ACQUIRE_TIMEOUT_MS";
/// Environment variable overriding the lock check timeout.
pub const ENV_LOCK_CHECK_TIMEOUT_MS: &str = "ARCO_HIVE_LOCK_CHECK_TIMEOUT_MS";
/// Environment variable overriding the local mutex eviction timeout.
pub const ENV_TABLE_LEVEL_LOCK_EVICT_MS: &str = "ARCO_HIVE_TABLE_LEVEL_LOCK_EVICT_MS";
/// Environment variable overriding the lock owner.
pub const ENV_LOCK_OWNER: &str = "ARCO_HIVE_LOCK_OWNER";

/// Default lock acquisition timeout (3 minutes).
pub const DEFAULT_LOCK_ACQUIRE_TIMEOUT_MS: u64 = 3 * 60 * 1000;
/// Default lock check timeout (5 seconds).
pub const DEFAULT_LOCK_CHECK_TIMEOUT_MS: u64 = 5_000;
/// Default local mutex eviction timeout (10 minutes).
pub const DEFAULT_TABLE_LEVEL_LOCK_EVICT_MS: u64 = 10 * 60 * 1000;

/// Lookup keys for each setting, in priority order.
struct KeySet {
    acquire: &'static [&'static str],
    check: &'static [&'static str],
    evict: &'static [&'static str],
    owner: &'static [&'static str],
}

const PROPERTY_KEYS: KeySet = KeySet {
    acquire: &[LOCK_ACQUIRE_TIMEOUT_MS, LOCK_ACQUIRE_TIMEOUT_ALIAS],
    check: &[LOCK_CHECK_TIMEOUT_MS, LOCK_CHECK_TIMEOUT_ALIAS],
    evict: &[TABLE_LEVEL_LOCK_EVICT_MS, TABLE_LEVEL_LOCK_EVICT_ALIAS],
    owner: &[LOCK_OWNER],
};

const ENV_KEYS: KeySet = KeySet {
    acquire: &[ENV_LOCK_ACQUIRE_TIMEOUT_MS],
    check: &[ENV_LOCK_CHECK_TIMEOUT_MS],
    evict: &[ENV_TABLE_LEVEL_LOCK_EVICT_MS],
    owner: &[ENV_LOCK_OWNER],
};

/// Timeouts and identity used by commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitConfig {
    /// Give up on the external lock after waiting this long.
    pub lock_acquire_timeout: Duration,
    /// Give up when a single lock status call takes longer than this.
    pub check_lock_timeout: Duration,
    /// Local commit mutexes idle longer than this may be evicted.
    pub table_level_lock_evict: Duration,
    /// Owner reported to the lock service and stamped on created entries.
    pub lock_owner: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            lock_acquire_timeout: Duration::from_millis(DEFAULT_LOCK_ACQUIRE_TIMEOUT_MS),
            check_lock_timeout: Duration::from_millis(DEFAULT_LOCK_CHECK_TIMEOUT_MS),
            table_level_lock_evict: Duration::from_millis(DEFAULT_TABLE_LEVEL_LOCK_EVICT_MS),
            lock_owner: default_owner(),
        }
    }
}

impl CommitConfig {
    /// Loads config from catalog properties.
    ///
    /// Both the `iceberg.hive.*` names and the short aliases are accepted; the
    /// long name wins when both are set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a timeout is not a positive integer.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| properties.get(key).cloned(), &PROPERTY_KEYS)
    }

    /// Loads config from process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a timeout is not a positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads config with a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a timeout is not a positive integer.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(get_env, &ENV_KEYS)
    }

    fn from_lookup<F>(lookup: F, keys: &KeySet) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let acquire_ms =
            parse_positive_u64(&lookup, keys.acquire, DEFAULT_LOCK_ACQUIRE_TIMEOUT_MS)?;
        let check_ms = parse_positive_u64(&lookup, keys.check, DEFAULT_LOCK_CHECK_TIMEOUT_MS)?;
        let evict_ms =
            parse_positive_u64(&lookup, keys.evict, DEFAULT_TABLE_LEVEL_LOCK_EVICT_MS)?;

        Ok(Self {
            lock_acquire_timeout: Duration::from_millis(acquire_ms),
            check_lock_timeout: Duration::from_millis(check_ms),
            table_level_lock_evict: Duration::from_millis(evict_ms),
            lock_owner: non_empty_string(&lookup, keys.owner).unwrap_or_else(default_owner),
        })
    }

    /// Overrides the lock acquisition timeout.
    #[must_use]
    pub fn with_lock_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.lock_acquire_timeout = timeout;
        self
    }

    /// Overrides the lock check timeout.
    #[must_use]
    pub fn with_check_lock_timeout(mut self, timeout: Duration) -> Self {
        self.check_lock_timeout = timeout;
        self
    }

    /// Overrides the local mutex eviction timeout.
    #[must_use]
    pub fn with_table_level_lock_evict(mut self, timeout: Duration) -> Self {
        self.table_level_lock_evict = timeout;
        self
    }

    /// Overrides the lock owner.
    #[must_use]
    pub fn with_lock_owner(mut self, owner: impl Into<String>) -> Self {
        self.lock_owner = owner.into();
        self
    }
}

fn default_owner() -> String {
    format!("arco-hive-{}", Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = CommitConfig::from_properties(&HashMap::new()).expect("defaults");
        assert_eq!(config.lock_acquire_timeout, Duration::from_secs(180));
        assert_eq!(config.check_lock_timeout, Duration::from_secs(5));
        assert_eq!(config.table_level_lock_evict, Duration::from_secs(600));
        assert!(config.lock_owner.starts_with("arco-hive-"));
    }

    #[test]
    fn test_long_names_and_aliases() {
        let config = CommitConfig::from_properties(&props(&[
            (LOCK_ACQUIRE_TIMEOUT_MS, "1000"),
            ("lock-acquire-timeout-ms", "2000"),
            ("lock-check-timeout-ms", "250"),
            ("table-level-lock-evict-ms", "60000"),
            (LOCK_OWNER, "etl@node-1"),
        ]))
        .expect("parse");

        assert_eq!(config.lock_acquire_timeout, Duration::from_millis(1000));
        assert_eq!(config.check_lock_timeout, Duration::from_millis(250));
        assert_eq!(config.table_level_lock_evict, Duration::from_secs(60));
        assert_eq!(config.lock_owner, "etl@node-1");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = CommitConfig::from_properties(&props(&[(LOCK_CHECK_TIMEOUT_MS, "0")]))
            .expect_err("zero");
        assert!(err.to_string().contains(LOCK_CHECK_TIMEOUT_MS));

        assert!(
            CommitConfig::from_properties(&props(&[("table-level-lock-evict-ms", "-5")]))
                .is_err()
        );
    }

    #[test]
    fn test_from_env_with() {
        let config = CommitConfig::from_env_with(|key| match key {
            ENV_LOCK_ACQUIRE_TIMEOUT_MS => Some("30000".into()),
            ENV_LOCK_OWNER => Some("worker-7".into()),
            _ => None,
        })
        .expect("env");

        assert_eq!(config.lock_acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.check_lock_timeout, Duration::from_secs(5));
        assert_eq!(config.lock_owner, "worker-7");
    }
}
