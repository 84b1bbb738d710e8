//! End-to-end create, update and refresh through `HiveCatalog`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use arco_hive::metastore::MetastoreError;
use arco_hive::pointer::{
    METADATA_LOCATION_PROP, PREVIOUS_METADATA_LOCATION_PROP, TABLE_TYPE_PROP, TableEntry,
};
use arco_hive::{CachedMetadataVersion, CatalogError};
use arco_test_utils::{
    MetastoreOp, ScriptedLockService, TestCatalog, fast_config, iceberg_entry, init_test_logging,
    test_table,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn catalog() -> TestCatalog<ScriptedLockService> {
    init_test_logging();
    TestCatalog::new(ScriptedLockService::granting(), fast_config())
}

#[tokio::test]
async fn create_points_entry_at_first_version() {
    let ctx = catalog();
    let mut ops = ctx.catalog.table_operations(test_table());

    let v0 = ops
        .commit(None, &json!({"format-version": 2}))
        .await
        .expect("create")
        .clone();

    let location = v0.metadata_location.clone().expect("location");
    assert!(location.starts_with("s3://warehouse/db/events/metadata/00000-"), "{location}");
    assert_eq!(v0.version, 0);

    let entry = ctx.store.snapshot(&test_table()).expect("entry");
    assert_eq!(entry.parameters.get(TABLE_TYPE_PROP).map(String::as_str), Some("ICEBERG"));
    assert_eq!(entry.metadata_location(), Some(location.as_str()));
    assert!(!entry.parameters.contains_key(PREVIOUS_METADATA_LOCATION_PROP));
    assert_eq!(entry.owner.as_deref(), Some("test-writer"));

    assert_eq!(ctx.locks.unlock_calls().len(), 1);
    assert!(ctx.writer.deleted().is_empty());
    assert!(
        !ctx.store
            .operations()
            .iter()
            .any(|op| matches!(op, MetastoreOp::Get { .. })),
        "create does not read the entry"
    );
}

#[tokio::test]
async fn update_chains_previous_location() {
    let ctx = catalog();
    let mut ops = ctx.catalog.table_operations(test_table());
    let v0 = ops.commit(None, &json!({"v": 0})).await.expect("create").clone();

    let base = ops.current_base();
    assert_eq!(base.as_ref(), Some(&v0));
    let v1 = ops.commit(base, &json!({"v": 1})).await.expect("update").clone();

    assert_eq!(v1.version, 1);
    let entry = ctx.store.snapshot(&test_table()).expect("entry");
    assert_eq!(
        entry.parameters.get(METADATA_LOCATION_PROP),
        v1.metadata_location.as_ref()
    );
    assert_eq!(
        entry.parameters.get(PREVIOUS_METADATA_LOCATION_PROP),
        v0.metadata_location.as_ref()
    );
    assert_eq!(ctx.locks.unlock_calls().len(), 2);
}

#[tokio::test]
async fn stale_base_fails_deletes_file_and_releases_lock() {
    let ctx = catalog();
    let mut writer_a = ctx.catalog.table_operations(test_table());
    let v0 = writer_a.commit(None, &json!({"v": 0})).await.expect("create").clone();

    let mut writer_b = ctx.catalog.load_table(test_table()).await.expect("load");
    assert_eq!(writer_b.current(), &v0);
    let v1 = writer_a
        .commit(Some(v0.clone()), &json!({"v": 1}))
        .await
        .expect("advance")
        .clone();

    let err = writer_b
        .commit(Some(v0.clone()), &json!({"v": "stale"}))
        .await
        .expect_err("stale base");

    assert!(matches!(err, CatalogError::CommitFailed { .. }), "{err}");
    assert!(err.is_retryable());
    assert_eq!(
        err.to_string(),
        format!(
            "Commit failed: Base metadata location '{}' is not the same as the current table \
             metadata location '{}' for db.events",
            v0.metadata_location.as_deref().expect("v0"),
            v1.metadata_location.as_deref().expect("v1"),
        )
    );

    let orphan = ctx.writer.written().last().cloned().expect("orphan");
    assert_eq!(ctx.writer.deleted(), vec![orphan.clone()]);
    assert!(!ctx.writer.exists(&orphan));
    assert_eq!(ctx.locks.unlock_calls().len(), 3);
    assert_eq!(writer_b.current(), &v0, "failed commit keeps the cache");

    // Refresh and retry lands on top of v1.
    writer_b.refresh().await.expect("refresh");
    let base = writer_b.current_base();
    let v2 = writer_b.commit(base, &json!({"v": 2})).await.expect("retry").clone();
    assert_eq!(v2.version, 2);
    let entry = ctx.store.snapshot(&test_table()).expect("entry");
    assert_eq!(entry.previous_metadata_location(), v1.metadata_location.as_deref());
}

#[tokio::test]
async fn refresh_of_missing_table_is_empty_and_idempotent() {
    let ctx = catalog();
    let mut ops = ctx.catalog.table_operations(test_table());

    assert!(ops.refresh().await.expect("first").is_empty());
    assert_eq!(ops.refresh().await.expect("second"), &CachedMetadataVersion::empty());
    assert_eq!(ops.current_base(), None);
}

#[tokio::test]
async fn refresh_picks_up_other_writers() {
    let ctx = catalog();
    let location = "s3://warehouse/db/events/metadata/00007-abc.metadata.json";
    ctx.store.inner().put(iceberg_entry(&test_table(), location));

    let mut ops = ctx.catalog.table_operations(test_table());
    let first = ops.refresh().await.expect("refresh").clone();
    let second = ops.refresh().await.expect("refresh again").clone();

    assert_eq!(first, second);
    assert_eq!(first.version, 7);
    assert_eq!(first.metadata_location.as_deref(), Some(location));
    assert_eq!(first.next_version(), 8);
}

#[tokio::test]
async fn refresh_transport_failure_is_communication_error() {
    let ctx = catalog();
    ctx.store.fail_next_get(MetastoreError::transport("connection refused"));

    let mut ops = ctx.catalog.table_operations(test_table());
    let err = ops.refresh().await.expect_err("transport");

    assert!(matches!(err, CatalogError::Communication { .. }), "{err}");
    assert_eq!(
        err.to_string(),
        "Failed to get table info from metastore db.events"
    );
    assert!(ops.current().is_empty());
}

#[tokio::test]
async fn refresh_rejects_non_iceberg_entries() {
    let ctx = catalog();
    let mut entry = TableEntry::new_external(test_table(), None);
    entry
        .parameters
        .insert(TABLE_TYPE_PROP.to_string(), "MANAGED_TABLE".to_string());
    ctx.store.inner().put(entry.clone());

    let mut ops = ctx.catalog.table_operations(test_table());
    let err = ops.refresh().await.expect_err("wrong kind");
    assert!(matches!(err, CatalogError::NotRecognized { .. }), "{err}");
    assert_eq!(
        err.to_string(),
        "Not an iceberg table: hive.db.events (type=MANAGED_TABLE)"
    );

    entry
        .parameters
        .insert(TABLE_TYPE_PROP.to_string(), "Iceberg".to_string());
    ctx.store.inner().put(entry);
    let err = ops.refresh().await.expect_err("no location");
    assert_eq!(
        err.to_string(),
        "Not an iceberg table: hive.db.events missing metadata_location"
    );
}

#[tokio::test]
async fn refresh_after_drop_is_not_found_and_keeps_cache() {
    let ctx = catalog();
    let mut ops = ctx.catalog.table_operations(test_table());
    let v0 = ops.commit(None, &json!({})).await.expect("create").clone();

    ctx.store.inner().remove(&test_table()).expect("dropped");
    let err = ops.refresh().await.expect_err("dropped");

    assert!(matches!(err, CatalogError::NotFound { .. }), "{err}");
    assert_eq!(err.to_string(), "No such table: db.events");
    assert_eq!(ops.current(), &v0);
}

#[tokio::test]
async fn cancelled_refresh_leaves_cache_unchanged() {
    let ctx = catalog();
    let mut ops = ctx.catalog.table_operations(test_table());
    let v0 = ops.commit(None, &json!({})).await.expect("create").clone();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = ops
        .refresh_with_cancellation(&cancel)
        .await
        .expect_err("cancelled");

    assert!(err.is_cancelled(), "{err}");
    assert_eq!(ops.current(), &v0);
}

#[tokio::test]
async fn load_table_requires_an_entry() {
    let ctx = catalog();
    let err = ctx
        .catalog
        .load_table(test_table())
        .await
        .expect_err("missing");
    assert!(matches!(err, CatalogError::NotFound { .. }), "{err}");
}

#[tokio::test]
async fn metadata_write_failure_skips_lock_and_metastore() {
    let ctx = catalog();
    ctx.writer.fail_writes();

    let mut ops = ctx.catalog.table_operations(test_table());
    let err = ops.commit(None, &json!({})).await.expect_err("write failed");

    assert!(matches!(err, CatalogError::MetadataWrite { .. }), "{err}");
    assert_eq!(
        err.to_string(),
        "Failed to write new metadata file for hive.db.events"
    );
    assert!(ctx.locks.requests().is_empty());
    assert!(ctx.store.operations().is_empty());
    assert!(ctx.writer.deleted().is_empty());
}

#[tokio::test]
async fn commit_on_top_of_oversized_version_prefix_succeeds() {
    let ctx = catalog();
    let location = format!("s3://warehouse/db/events/metadata/{}-x.metadata.json", i64::MAX);
    ctx.store.inner().put(iceberg_entry(&test_table(), &location));

    let mut ops = ctx.catalog.load_table(test_table()).await.expect("load");
    assert_eq!(ops.current().version, -1);
    assert_eq!(ops.current().metadata_location.as_deref(), Some(location.as_str()));

    let base = ops.current_base();
    let next = ops.commit(base, &json!({})).await.expect("commit").clone();

    assert_eq!(next.version, 0);
    let entry = ctx.store.snapshot(&test_table()).expect("entry");
    assert_eq!(entry.previous_metadata_location(), Some(location.as_str()));
}
