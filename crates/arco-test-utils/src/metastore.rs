//! Fault-injecting pointer store.
//!
//! Wraps [`MemoryPointerStore`] and reproduces the failure modes a remote
//! metastore exhibits: apply calls that fail after (or before) persisting,
//! calls that never return, reads that fail, and other writers moving the
//! pointer in between.

use std::sync::{Arc, Mutex};

use arco_hive::memory::MemoryPointerStore;
use arco_hive::metastore::{MetastoreError, MetastoreResult, PointerStore, UpdateOptions};
use arco_hive::pointer::{TableEntry, TableIdent};
use async_trait::async_trait;

/// What the next apply (`create_table`/`alter_table`) call does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyFault {
    /// Persists the entry, then reports `error` to the caller.
    PersistThenFail(MetastoreError),
    /// Reports `error` without persisting anything.
    FailWithoutPersisting(MetastoreError),
    /// Persists the entry, then never returns.
    PersistThenHang,
    /// Never returns and never persists.
    Hang,
}

/// Record of a call made against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetastoreOp {
    /// `get_table`.
    Get {
        /// Table read.
        table: TableIdent,
    },
    /// `create_table`.
    Create {
        /// Location the entry pointed at.
        metadata_location: Option<String>,
    },
    /// `alter_table`.
    Alter {
        /// Location the entry pointed at.
        metadata_location: Option<String>,
        /// Options passed with the call.
        options: UpdateOptions,
    },
}

#[derive(Debug, Default)]
struct Faults {
    next_apply: Option<ApplyFault>,
    other_writer: Option<String>,
    fail_gets_after_fault: bool,
    fail_next_get: Option<MetastoreError>,
    fault_fired: bool,
    operations: Vec<MetastoreOp>,
}

/// [`PointerStore`] with scripted failures layered over an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct FaultyPointerStore {
    inner: MemoryPointerStore,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyPointerStore {
    /// Creates an empty store with no faults armed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying store, for direct fixture setup and inspection.
    pub fn inner(&self) -> &MemoryPointerStore {
        &self.inner
    }

    /// Current entry for `ident`, bypassing faults and the call log.
    pub fn snapshot(&self, ident: &TableIdent) -> Option<TableEntry> {
        self.inner.snapshot(ident)
    }

    /// Arms a fault for the next apply call.
    pub fn fail_next_apply(&self, fault: ApplyFault) {
        self.faults.lock().expect("lock").next_apply = Some(fault);
    }

    /// After the armed apply fault fires, another writer commits `location`
    /// on top of whatever the entry then points at.
    pub fn then_other_writer_commits(&self, location: impl Into<String>) {
        self.faults.lock().expect("lock").other_writer = Some(location.into());
    }

    /// After the armed apply fault fires, every `get_table` fails.
    pub fn fail_reads_after_fault(&self) {
        self.faults.lock().expect("lock").fail_gets_after_fault = true;
    }

    /// Fails the next `get_table` with `error`.
    pub fn fail_next_get(&self, error: MetastoreError) {
        self.faults.lock().expect("lock").fail_next_get = Some(error);
    }

    /// All calls received, in order.
    pub fn operations(&self) -> Vec<MetastoreOp> {
        self.faults.lock().expect("lock").operations.clone()
    }

    /// Number of `get_table` calls received.
    pub fn get_calls(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, MetastoreOp::Get { .. }))
            .count()
    }

    fn record(&self, op: MetastoreOp) {
        self.faults.lock().expect("lock").operations.push(op);
    }

    fn take_fault(&self) -> Option<ApplyFault> {
        let mut faults = self.faults.lock().expect("lock");
        let fault = faults.next_apply.take();
        if fault.is_some() {
            faults.fault_fired = true;
        }
        fault
    }

    fn run_other_writer(&self, ident: &TableIdent) {
        let Some(location) = self.faults.lock().expect("lock").other_writer.take() else {
            return;
        };
        if let Some(mut entry) = self.inner.snapshot(ident) {
            let current = entry.metadata_location().map(str::to_string);
            entry.stamp(&location, current.as_deref());
            self.inner.put(entry);
        }
    }

    async fn apply_with_fault<F>(
        &self,
        ident: &TableIdent,
        fault: Option<ApplyFault>,
        persist: F,
    ) -> MetastoreResult<()>
    where
        F: std::future::Future<Output = MetastoreResult<()>> + Send,
    {
        let Some(fault) = fault else {
            return persist.await;
        };
        let result = match fault {
            ApplyFault::PersistThenFail(error) => {
                persist.await?;
                Err(error)
            }
            ApplyFault::FailWithoutPersisting(error) => Err(error),
            ApplyFault::PersistThenHang => {
                persist.await?;
                self.run_other_writer(ident);
                return std::future::pending().await;
            }
            ApplyFault::Hang => {
                self.run_other_writer(ident);
                return std::future::pending().await;
            }
        };
        self.run_other_writer(ident);
        result
    }
}

#[async_trait]
impl PointerStore for FaultyPointerStore {
    async fn get_table(&self, ident: &TableIdent) -> MetastoreResult<Option<TableEntry>> {
        self.record(MetastoreOp::Get {
            table: ident.clone(),
        });
        {
            let mut faults = self.faults.lock().expect("lock");
            if let Some(error) = faults.fail_next_get.take() {
                return Err(error);
            }
            if faults.fault_fired && faults.fail_gets_after_fault {
                return Err(MetastoreError::transport("metastore unreachable"));
            }
        }
        self.inner.get_table(ident).await
    }

    async fn create_table(&self, entry: &TableEntry) -> MetastoreResult<()> {
        self.record(MetastoreOp::Create {
            metadata_location: entry.metadata_location().map(str::to_string),
        });
        let fault = self.take_fault();
        self.apply_with_fault(&entry.ident, fault, self.inner.create_table(entry))
            .await
    }

    async fn alter_table(
        &self,
        ident: &TableIdent,
        entry: &TableEntry,
        options: UpdateOptions,
    ) -> MetastoreResult<()> {
        self.record(MetastoreOp::Alter {
            metadata_location: entry.metadata_location().map(str::to_string),
            options,
        });
        let fault = self.take_fault();
        self.apply_with_fault(ident, fault, self.inner.alter_table(ident, entry, options))
            .await
    }
}
