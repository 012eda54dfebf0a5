//! Tests for memoized sync and async functions

use photo_cache::cache::{CacheManager, InProcessStore, Memoize};
use photo_cache::config::MemoryTierConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn memory_cache() -> Arc<CacheManager> {
    Arc::new(CacheManager::memory_only(MemoryTierConfig::default()).unwrap())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FaceSummary {
    folder_id: String,
    faces: u32,
}

#[tokio::test]
async fn test_async_function_runs_once_per_argument() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let summarize = Memoize::new(memory_cache(), "encodings", "summarize")
        .ttl(Duration::from_secs(600))
        .wrap(move |folder_id: String| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                FaceSummary {
                    faces: folder_id.len() as u32,
                    folder_id,
                }
            }
        });

    let first = summarize.call("abc".to_string()).await.unwrap();
    let second = summarize.call("abc".to_string()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.faces, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    summarize.call("other".to_string()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sync_function_is_memoized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let square = Memoize::new(memory_cache(), "math", "square").wrap_sync(move |n: u64| {
        counter.fetch_add(1, Ordering::SeqCst);
        n * n
    });

    assert_eq!(square.call(12).await.unwrap(), 144);
    assert_eq!(square.call(12).await.unwrap(), 144);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidation_event_forces_recompute() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let list = Memoize::new(memory_cache(), "folders", "list_folders")
        .invalidate_on(["folder_created", "folder_deleted"])
        .wrap_sync(move |root: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            vec![format!("{}-{}", root, n)]
        });

    let a = list.call("R".to_string()).await.unwrap();
    let b = list
        .call_with_events("R".to_string(), &["image_uploaded"])
        .await
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let c = list
        .call_with_events("R".to_string(), &["image_uploaded", "folder_created"])
        .await
        .unwrap();
    assert_ne!(a, c);
    assert_eq!(c, vec!["R-1".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_custom_key_function_collapses_arguments() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let lookup = Memoize::new(memory_cache(), "images", "lookup")
        .key_fn(|(folder_id, _request_id): &(String, u64)| format!("lookup:{}", folder_id))
        .wrap_sync(move |(folder_id, _): (String, u64)| {
            counter.fetch_add(1, Ordering::SeqCst);
            folder_id.to_uppercase()
        });

    assert_eq!(lookup.call(("f1".into(), 1)).await.unwrap(), "F1");
    assert_eq!(lookup.call(("f1".into(), 2)).await.unwrap(), "F1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Stand-in for a drive client handle: shared, not serializable.
struct DriveClient {
    account: String,
    listings: AtomicUsize,
}

#[tokio::test]
async fn test_keyed_memoize_accepts_non_serializable_arguments() {
    let client = Arc::new(DriveClient {
        account: "studio@example.com".into(),
        listings: AtomicUsize::new(0),
    });
    let list_root = Memoize::keyed(
        memory_cache(),
        "folders",
        "list_root",
        |(client, root): &(Arc<DriveClient>, String)| format!("{}:{}", client.account, root),
    )
    .invalidate_on(["folder_created"])
    .wrap(|(client, root): (Arc<DriveClient>, String)| async move {
        client.listings.fetch_add(1, Ordering::SeqCst);
        vec![format!("{}/2024-wedding", root)]
    });

    let first = list_root.call((client.clone(), "R".into())).await.unwrap();
    let second = list_root.call((client.clone(), "R".into())).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(client.listings.load(Ordering::SeqCst), 1);

    list_root
        .call_with_events((client.clone(), "R".into()), &["folder_created"])
        .await
        .unwrap();
    assert_eq!(client.listings.load(Ordering::SeqCst), 2);

    list_root.invalidate(&(client.clone(), "R".into())).await.unwrap();
    list_root.call((client.clone(), "R".into())).await.unwrap();
    assert_eq!(client.listings.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_explicit_invalidate_and_shared_store() {
    let store = Arc::new(InProcessStore::new());
    let cache = Arc::new(
        CacheManager::builder()
            .distributed(store.clone())
            .build()
            .await
            .unwrap(),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let count = Memoize::new(cache.clone(), "images", "count")
        .wrap_sync(move |folder: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            folder.len()
        });

    count.call("abcd".to_string()).await.unwrap();
    assert_eq!(store.len(), 1);

    count.invalidate(&"abcd".to_string()).await.unwrap();
    assert!(store.is_empty());
    assert!(cache.memory().is_empty());

    assert_eq!(count.call("abcd".to_string()).await.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_memoized_call_from_sync_context() {
    let double = Memoize::new(memory_cache(), "math", "double").wrap_sync(|n: i64| n * 2);
    let out = tokio_test::block_on(async {
        let first = double.call(21).await.unwrap();
        let second = double.call(21).await.unwrap();
        (first, second)
    });
    assert_eq!(out, (42, 42));
}
