//! Concurrent commits against one table.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arco_hive::memory::MemoryLockService;
use arco_hive::metastore::LockService;
use arco_hive::{CatalogError, CommitConfig, HiveCatalog, LocalCommitThrottle};
use arco_test_utils::{
    FaultyPointerStore, RecordingMetadataWriter, ScriptedLockService, TEST_CATALOG, fast_config,
    init_test_logging, test_table,
};
use serde_json::json;

const TABLE_KEY: &str = "hive.db.events";

struct Shared {
    store: FaultyPointerStore,
    writer: RecordingMetadataWriter,
}

impl Shared {
    fn new() -> Self {
        Self {
            store: FaultyPointerStore::new(),
            writer: RecordingMetadataWriter::new("s3://warehouse/db/events"),
        }
    }

    fn catalog<L>(&self, locks: &L, config: CommitConfig) -> HiveCatalog<RecordingMetadataWriter>
    where
        L: LockService + Clone + 'static,
    {
        HiveCatalog::new(
            TEST_CATALOG,
            Arc::new(self.store.clone()),
            Arc::new(locks.clone()),
            Arc::new(self.writer.clone()),
            config,
        )
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_commits_on_same_base_have_one_winner() {
    init_test_logging();
    let shared = Shared::new();
    let locks = MemoryLockService::new();
    // Separate catalogs model separate processes: only the external lock
    // and the CAS check stand between them.
    let catalog_a = shared.catalog(&locks, fast_config().with_lock_owner("writer-a"));
    let catalog_b = shared.catalog(&locks, fast_config().with_lock_owner("writer-b"));

    let v0 = catalog_a
        .table_operations(test_table())
        .commit(None, &json!({"v": 0}))
        .await
        .expect("create")
        .clone();

    let mut ops_a = catalog_a.load_table(test_table()).await.expect("load a");
    let mut ops_b = catalog_b.load_table(test_table()).await.expect("load b");
    let base_a = ops_a.current_base();
    let base_b = ops_b.current_base();
    assert_eq!(base_a.as_ref(), Some(&v0));

    let payload_a = json!({"writer": "a"});
    let payload_b = json!({"writer": "b"});
    let (a, b) = tokio::join!(
        ops_a.commit(base_a, &payload_a),
        ops_b.commit(base_b, &payload_b),
    );
    let a = a.cloned();
    let b = b.cloned();

    let (winner, loser) = match (a, b) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        (a, b) => panic!("expected exactly one winner, got {a:?} and {b:?}"),
    };
    assert!(matches!(loser, CatalogError::CommitFailed { .. }), "{loser}");

    let entry = shared.store.snapshot(&test_table()).expect("entry");
    assert_eq!(entry.metadata_location(), winner.metadata_location.as_deref());
    assert_eq!(entry.previous_metadata_location(), v0.metadata_location.as_deref());

    let written = shared.writer.written();
    assert_eq!(written.len(), 3);
    let deleted = shared.writer.deleted();
    assert_eq!(deleted.len(), 1);
    assert_ne!(Some(deleted[0].as_str()), winner.metadata_location.as_deref());
    assert_eq!(locks.live_locks(), 0);
    assert_eq!(locks.holder(&test_table()), None);
}

#[tokio::test(start_paused = true)]
async fn local_waiters_reach_the_lock_service_in_arrival_order() {
    init_test_logging();
    let shared = Shared::new();
    let locks = ScriptedLockService::granting();
    let throttle = Arc::new(LocalCommitThrottle::new(Duration::from_secs(600)));

    let held = throttle.acquire(TABLE_KEY).await;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let catalog = shared
            .catalog(&locks, fast_config().with_lock_owner(format!("writer-{i}")))
            .with_throttle(Arc::clone(&throttle));
        tasks.push(tokio::spawn(async move {
            let mut ops = catalog.table_operations(test_table());
            ops.commit(None, &json!({"writer": i})).await.cloned()
        }));
        // Let the task park on the local mutex before spawning the next one.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(locks.requests().is_empty(), "nobody passes a held local mutex");
    drop(held);

    let mut created = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(_) => created += 1,
            Err(err) => assert!(matches!(err, CatalogError::AlreadyExists { .. }), "{err}"),
        }
    }
    assert_eq!(created, 1);

    let owners: Vec<String> = locks.requests().into_iter().map(|r| r.owner).collect();
    assert_eq!(owners, ["writer-0", "writer-1", "writer-2", "writer-3"]);
    assert_eq!(locks.unlock_calls().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eviction_racing_acquisition_never_admits_two_holders() {
    let throttle = Arc::new(LocalCommitThrottle::new(Duration::ZERO));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let evictor = {
        let throttle = Arc::clone(&throttle);
        tokio::spawn(async move {
            for _ in 0..2_000 {
                throttle.evict_idle();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut workers = Vec::new();
    for _ in 0..8 {
        let throttle = Arc::clone(&throttle);
        let inside = Arc::clone(&inside);
        let max_inside = Arc::clone(&max_inside);
        workers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let handle = throttle.acquire(TABLE_KEY).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
                drop(handle);
            }
        }));
    }

    for worker in workers {
        worker.await.expect("worker");
    }
    evictor.await.expect("evictor");

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(1)).await;
    throttle.evict_idle();
    assert!(throttle.is_empty());
}
