//! Cleanup batches against both store backends

use quill_core::config::{CleanupConfig, StoreConfig};
use quill_core::core_access::Timestamp;
use quill_core::core_collab::CleanupScheduler;
use quill_core::core_store::{AccessStore, MemoryAccessStore, SqlAccessStore};
use quill_core::ports::FsObjectStore;
use quill_core::shutdown::ShutdownCoordinator;
use quill_core::test_utils::{seed_document, seed_media, seed_user, FakeObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn cleanup_config() -> CleanupConfig {
    CleanupConfig {
        retention: Duration::from_secs(20 * 60),
        max_concurrency: 3,
        ..CleanupConfig::default()
    }
}

fn expired_at() -> Timestamp {
    Timestamp::now().saturating_sub(Duration::from_secs(2 * 3600))
}

/// One failing item in ten costs exactly one failure
#[tokio::test]
async fn test_single_failure_does_not_stop_batch() {
    let store = Arc::new(MemoryAccessStore::new());
    let objects = Arc::new(FakeObjectStore::new());
    let owner = seed_user(store.as_ref(), "owner@example.com").await.unwrap();
    let doc = seed_document(store.as_ref(), &owner, "Exports").await.unwrap();

    for i in 1..=10 {
        seed_media(store.as_ref(), &doc, &format!("export-{}", i), expired_at())
            .await
            .unwrap();
    }
    objects.fail_for("export-3");

    let scheduler = CleanupScheduler::new(
        store.clone(),
        objects.clone(),
        Arc::new(ShutdownCoordinator::new(Duration::ZERO)),
        &cleanup_config(),
    );
    let report = scheduler.run_batch().await.unwrap();

    assert_eq!(report.expired, 10);
    assert_eq!(report.dispatched, 10);
    assert_eq!(report.deleted, 9);
    assert_eq!(report.failures, 1);
    assert!(!report.interrupted);

    let mut deleted = objects.deleted();
    deleted.sort();
    assert_eq!(deleted.len(), 9);
    assert!(!deleted.contains(&"export-3".to_string()));

    let remaining = store
        .list_media_created_before(Timestamp::from_millis(u64::MAX))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].locator.public_id, "export-3");
}

#[tokio::test]
async fn test_sql_store_with_filesystem_objects() {
    let dir = tempdir().unwrap();
    let media_root = dir.path().join("media");
    std::fs::create_dir_all(&media_root).unwrap();

    let store = Arc::new(
        SqlAccessStore::open(&StoreConfig {
            database_path: dir.path().join("quill.db"),
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    );
    let owner = seed_user(store.as_ref(), "owner@example.com").await.unwrap();
    let doc = seed_document(store.as_ref(), &owner, "Exports").await.unwrap();

    // One object exists on disk, the other is already gone
    std::fs::write(media_root.join("present.pdf"), b"%PDF").unwrap();
    seed_media(store.as_ref(), &doc, "present.pdf", expired_at()).await.unwrap();
    seed_media(store.as_ref(), &doc, "missing.pdf", expired_at()).await.unwrap();
    seed_media(store.as_ref(), &doc, "recent.pdf", Timestamp::now()).await.unwrap();

    let scheduler = CleanupScheduler::new(
        store.clone(),
        Arc::new(FsObjectStore::new(media_root.clone())),
        Arc::new(ShutdownCoordinator::new(Duration::ZERO)),
        &cleanup_config(),
    );
    let report = scheduler.run_batch().await.unwrap();

    assert_eq!(report.expired, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.failures, 0);
    assert!(!media_root.join("present.pdf").exists());

    let remaining = store
        .list_media_created_before(Timestamp::from_millis(i64::MAX as u64))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].locator.public_id, "recent.pdf");
}

#[tokio::test]
async fn test_in_flight_deletes_stay_within_limit() {
    let store = Arc::new(MemoryAccessStore::new());
    let objects = Arc::new(FakeObjectStore::new().with_delay(Duration::from_millis(50)));
    let owner = seed_user(store.as_ref(), "owner@example.com").await.unwrap();
    let doc = seed_document(store.as_ref(), &owner, "Exports").await.unwrap();

    for i in 1..=12 {
        seed_media(store.as_ref(), &doc, &format!("export-{}", i), expired_at())
            .await
            .unwrap();
    }

    let config = cleanup_config();
    let scheduler = CleanupScheduler::new(
        store,
        objects.clone(),
        Arc::new(ShutdownCoordinator::new(Duration::ZERO)),
        &config,
    );
    let report = scheduler.run_batch().await.unwrap();

    assert_eq!(report.deleted, 12);
    assert!(objects.peak_in_flight() <= config.max_concurrency);
    assert!(objects.peak_in_flight() > 1);
}

#[tokio::test]
async fn test_sql_media_outlives_deleted_document() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        SqlAccessStore::open(&StoreConfig {
            database_path: dir.path().join("quill.db"),
            pool_size: 2,
            busy_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    );
    let objects = Arc::new(FakeObjectStore::new());
    let owner = seed_user(store.as_ref(), "owner@example.com").await.unwrap();
    let doc = seed_document(store.as_ref(), &owner, "Exports").await.unwrap();
    seed_media(store.as_ref(), &doc, "exports/final.pdf", expired_at())
        .await
        .unwrap();

    store.delete_document(&doc.id).await.unwrap();

    let scheduler = CleanupScheduler::new(
        store.clone(),
        objects.clone(),
        Arc::new(ShutdownCoordinator::new(Duration::ZERO)),
        &cleanup_config(),
    );
    let report = scheduler.run_batch().await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(objects.deleted(), vec!["exports/final.pdf".to_string()]);
    assert!(store
        .list_media_created_before(Timestamp::from_millis(i64::MAX as u64))
        .await
        .unwrap()
        .is_empty());
}
