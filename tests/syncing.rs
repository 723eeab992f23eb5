//! Tree sync across local and in-memory backends

use blobsync::{
    sync, sync_all, sync_iterator, BlobSyncError, BoostConfig, BoostExecutor, MemoryStore,
    StoragePath, SyncAction, SyncOptions,
};
use futures::TryStreamExt;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn create_test_file(dir: &Path, name: &str, content: &[u8]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

async fn plan(src: &StoragePath, dst: &StoragePath, options: SyncOptions) -> Vec<SyncAction> {
    sync_iterator(src, dst, options).await.unwrap().collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_basic_diff_into_empty_destination() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    create_test_file(src.path(), "a", &[0; 10]);
    create_test_file(src.path(), "b/c", &[0; 5]);

    let src = StoragePath::local(src.path());
    let expected = vec![SyncAction::copy("a", 10), SyncAction::copy("b/c", 5)];
    assert_eq!(plan(&src, &StoragePath::local(dst.path()), SyncOptions::new()).await, expected);

    // A destination that does not exist yet is just empty
    let missing = StoragePath::local(dst.path().join("not/yet"));
    assert_eq!(plan(&src, &missing, SyncOptions::new()).await, expected);
}

#[tokio::test]
async fn test_delete_semantics() {
    let store = MemoryStore::new();
    store.put("src/a", vec![0; 10]);
    store.put("dst/a", vec![1; 10]);
    store.put("dst/stale", vec![0; 3]);
    let (src, dst) = (store.path("src"), store.path("dst"));

    assert!(plan(&src, &dst, SyncOptions::new()).await.is_empty());
    assert_eq!(
        plan(&src, &dst, SyncOptions::new().delete(true)).await,
        vec![SyncAction::delete("stale")]
    );
}

#[tokio::test]
async fn test_same_size_change_is_not_detected() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    create_test_file(dst.path(), "f", b"old!");
    create_test_file(src.path(), "f", b"new!");

    let actions = plan(
        &StoragePath::local(src.path()),
        &StoragePath::local(dst.path()),
        SyncOptions::new(),
    )
    .await;
    assert!(actions.is_empty());
}

#[tokio::test]
async fn test_mtime_hint_copies_newer_source() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    create_test_file(src.path(), "f", b"new!");
    create_test_file(dst.path(), "f", b"old!");

    let past = SystemTime::now() - Duration::from_secs(3600);
    filetime::set_file_mtime(dst.path().join("f"), filetime::FileTime::from_system_time(past))
        .unwrap();

    let (src, dst) = (StoragePath::local(src.path()), StoragePath::local(dst.path()));
    assert!(plan(&src, &dst, SyncOptions::new()).await.is_empty());
    assert_eq!(
        plan(&src, &dst, SyncOptions::new().mtime_hint(true)).await,
        vec![SyncAction::copy("f", 4)]
    );
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    init_tracing();
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    create_test_file(src.path(), "one", b"1");
    create_test_file(src.path(), "deep/er/two", b"22");
    create_test_file(src.path(), "deep/three", b"333");
    create_test_file(dst.path(), "extra", b"xx");
    create_test_file(dst.path(), "one", b"not one");

    let executor = BoostExecutor::new(4).unwrap();
    let options = SyncOptions::new().delete(true);
    let (src_path, dst_path) = (StoragePath::local(src.path()), StoragePath::local(dst.path()));

    let mut applied: Vec<String> = sync(&src_path, &dst_path, &executor, options)
        .try_collect()
        .await
        .unwrap();
    applied.sort();
    assert_eq!(applied, vec!["deep/er/two", "deep/three", "extra", "one"]);

    assert_eq!(std::fs::read(dst.path().join("one")).unwrap(), b"1");
    assert_eq!(std::fs::read(dst.path().join("deep/er/two")).unwrap(), b"22");
    assert!(!dst.path().join("extra").exists());

    let again: Vec<String> = sync(&src_path, &dst_path, &executor, options)
        .try_collect()
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(executor.in_flight(), 0);
}

#[tokio::test]
async fn test_sync_all_summary() {
    let store = MemoryStore::with_latency(Duration::from_millis(1));
    for i in 0..20 {
        store.put(format!("src/file{:02}", i), vec![7; 100]);
    }
    store.put("dst/old", vec![0; 50]);

    let executor = BoostExecutor::new(8).unwrap();
    let summary = sync_all(
        &store.path("src"),
        &store.path("dst"),
        &executor,
        SyncOptions::new().delete(true),
    )
    .await
    .unwrap();

    assert_eq!(summary.copied, 20);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.bytes_copied, 2000);
    assert_eq!(store.get("dst/file07").unwrap(), vec![7; 100]);
    assert!(store.get("dst/old").is_none());
}

#[tokio::test]
async fn test_sync_across_backends() {
    let src = TempDir::new().unwrap();
    create_test_file(src.path(), "a.bin", &[1; 3000]);
    create_test_file(src.path(), "sub/b.bin", b"bee");

    let store = MemoryStore::new();
    let executor = BoostExecutor::new(2).unwrap();
    let local_src = StoragePath::local(src.path());
    let remote = store.path("mirror/");

    let summary = sync_all(&local_src, &remote, &executor, SyncOptions::new())
        .await
        .unwrap();
    assert_eq!(summary.copied, 2);
    assert_eq!(store.keys(), vec!["mirror/a.bin", "mirror/sub/b.bin"]);
    assert_eq!(store.get("mirror/a.bin").unwrap(), vec![1; 3000]);

    let back = TempDir::new().unwrap();
    let local_dst = StoragePath::local(back.path().join("restored"));
    sync_all(&remote, &local_dst, &executor, SyncOptions::new())
        .await
        .unwrap();
    assert_eq!(std::fs::read(back.path().join("restored/sub/b.bin")).unwrap(), b"bee");

    let diff = plan(&local_src, &local_dst, SyncOptions::new().delete(true)).await;
    assert!(diff.is_empty());
}

#[tokio::test]
async fn test_missing_source_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = sync_iterator(
        &StoragePath::local(dir.path().join("absent")),
        &StoragePath::local(dir.path()),
        SyncOptions::new(),
    )
    .await
    .unwrap_err();
    assert!(err.is_not_found());

    let store = MemoryStore::new();
    let err = sync_iterator(&store.path("absent"), &store.path("dst"), SyncOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let executor = BoostExecutor::new(2).unwrap();
    let err = sync(&store.path("absent"), &store.path("dst"), &executor, SyncOptions::new())
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_file_source_is_not_a_directory() {
    let dir = TempDir::new().unwrap();
    create_test_file(dir.path(), "plain", b"data");

    let err = sync_iterator(
        &StoragePath::local(dir.path().join("plain")),
        &StoragePath::local(dir.path().join("out")),
        SyncOptions::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BlobSyncError::NotADirectory(_)));

    let store = MemoryStore::new();
    store.put("plain", b"data".to_vec());
    let err = sync_iterator(&store.path("plain"), &store.path("out"), SyncOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlobSyncError::NotADirectory(_)));
}

#[tokio::test]
async fn test_empty_source_directory() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    create_test_file(dst.path(), "x", b"x");
    create_test_file(dst.path(), "y/z", b"z");

    let (src, dst) = (StoragePath::local(src.path()), StoragePath::local(dst.path()));
    assert!(plan(&src, &dst, SyncOptions::new()).await.is_empty());
    assert_eq!(
        plan(&src, &dst, SyncOptions::new().delete(true)).await,
        vec![SyncAction::delete("x"), SyncAction::delete("y/z")]
    );
}

#[tokio::test]
async fn test_destination_file_fails() {
    let dir = TempDir::new().unwrap();
    create_test_file(dir.path(), "src/a", b"a");
    create_test_file(dir.path(), "dst", b"in the way");

    let err = sync_iterator(
        &StoragePath::local(dir.path().join("src")),
        &StoragePath::local(dir.path().join("dst")),
        SyncOptions::new(),
    )
    .await
    .unwrap_err();
    assert!(err.is_type_mismatch());
}

#[tokio::test]
async fn test_chunked_copies_on_single_slot() {
    let store = MemoryStore::with_latency(Duration::from_millis(1));
    let big: Vec<u8> = (0..200u8).collect();
    store.put("src/big", big.clone());
    store.put("src/small", vec![3; 5]);

    let config = BoostConfig {
        concurrency: 1,
        chunk_size: 16,
        ..BoostConfig::default()
    };
    let executor = BoostExecutor::with_config(config).unwrap();
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        sync_all(&store.path("src"), &store.path("dst"), &executor, SyncOptions::new()),
    )
    .await
    .expect("sync stalled on a single slot")
    .unwrap();

    assert_eq!(summary.copied, 2);
    assert_eq!(store.get("dst/big").unwrap(), big);
    assert_eq!(executor.in_flight(), 0);
}
