//! Integration tests for the two-tier cache manager

use async_trait::async_trait;
use photo_cache::cache::{derive_key, CacheKey, CacheManager, DistributedTier, InProcessStore};
use photo_cache::config::{CacheConfig, MemoryTierConfig};
use photo_cache::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);

/// Store that fails every call, like a Redis server that went away after connect.
#[derive(Default)]
struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::unavailable("failing", "connection reset by peer"))
    }
}

#[async_trait]
impl DistributedTier for FailingStore {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        self.fail()
    }
    async fn set_with_ttl(&self, _: &CacheKey, _: &[u8], _: Duration) -> Result<()> {
        self.fail()
    }
    async fn delete(&self, _: &CacheKey) -> Result<()> {
        self.fail()
    }
    async fn delete_by_prefix(&self, _: &str) -> Result<usize> {
        self.fail()
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Folder {
    id: String,
    name: String,
}

fn folders() -> Vec<Folder> {
    vec![
        Folder {
            id: "f1".into(),
            name: "2024-wedding".into(),
        },
        Folder {
            id: "f2".into(),
            name: "2024-portraits".into(),
        },
    ]
}

async fn with_store(store: Arc<InProcessStore>) -> CacheManager {
    CacheManager::builder()
        .distributed(store)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_miss_then_hit_updates_statistics() {
    let cache = CacheManager::memory_only(MemoryTierConfig::default()).unwrap();
    let params = json!({"root_id": "R"});

    let first: Option<Vec<Folder>> = cache.get("folders", "list", &params).await.unwrap();
    assert!(first.is_none());

    cache
        .set("folders", "list", &folders(), TTL, &params)
        .await
        .unwrap();
    let second: Option<Vec<Folder>> = cache.get("folders", "list", &params).await.unwrap();
    assert_eq!(second, Some(folders()));

    let stats = cache.statistics();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.total_requests(), 2);
    assert_eq!(stats.hit_rate(), 50.0);
    assert_eq!(stats.memory_items, 1);
    assert!(!stats.distributed_available);
}

#[tokio::test]
async fn test_param_order_does_not_change_the_entry() {
    let cache = CacheManager::memory_only(MemoryTierConfig::default()).unwrap();
    cache
        .set("images", "list", &vec!["a.jpg"], TTL, &json!({"folder_id": "F", "page": 2}))
        .await
        .unwrap();

    #[derive(Serialize)]
    struct Reordered<'a> {
        page: u32,
        folder_id: &'a str,
    }
    let hit: Option<Vec<String>> = cache
        .get(
            "images",
            "list",
            &Reordered {
                page: 2,
                folder_id: "F",
            },
        )
        .await
        .unwrap();
    assert_eq!(hit, Some(vec!["a.jpg".to_string()]));
}

#[tokio::test]
async fn test_non_map_params_are_rejected() {
    let cache = CacheManager::memory_only(MemoryTierConfig::default()).unwrap();
    let err = cache
        .get::<serde_json::Value, _>("folders", "list", &json!(["R"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));

    let err = cache
        .set("folders", "list", &1, TTL, &"R")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    assert_eq!(cache.statistics().total_requests(), 0);
}

#[tokio::test]
async fn test_shape_mismatch_reads_as_miss() {
    let cache = CacheManager::memory_only(MemoryTierConfig::default()).unwrap();
    cache
        .set("folders", "list", &"not a list", TTL, &())
        .await
        .unwrap();
    let got: Option<Vec<Folder>> = cache.get("folders", "list", &()).await.unwrap();
    assert!(got.is_none());
    let stats = cache.statistics();
    assert_eq!((stats.hits, stats.misses), (0, 1));

    // The untyped read still sees the stored value.
    let raw = cache.get_value("folders", "list", &()).await.unwrap();
    assert_eq!(raw, Some(json!("not a list")));
    assert_eq!(cache.statistics().hits, 1);
}

#[tokio::test]
async fn test_memory_only_rejects_invalid_tier_config() {
    let whole_map = MemoryTierConfig::new()
        .with_max_items(1)
        .with_evict_fraction(1.0);
    let err = CacheManager::memory_only(whole_map).err().unwrap();
    assert!(matches!(err, Error::Configuration { .. }));
    let nan = MemoryTierConfig::new().with_evict_fraction(f64::NAN);
    assert!(CacheManager::memory_only(nan).is_err());

    // Smallest valid tier still serves the entry it just stored.
    let tiny = CacheManager::memory_only(MemoryTierConfig::new().with_max_items(1)).unwrap();
    cache_two_and_read_last(&tiny).await;
}

async fn cache_two_and_read_last(cache: &CacheManager) {
    cache.set("images", "list", &"a", TTL, &json!({"folder_id": "a"})).await.unwrap();
    cache.set("images", "list", &"b", TTL, &json!({"folder_id": "b"})).await.unwrap();
    let got: Option<String> = cache
        .get("images", "list", &json!({"folder_id": "b"}))
        .await
        .unwrap();
    assert_eq!(got.as_deref(), Some("b"));
    assert_eq!(cache.memory().len(), 1);
}

#[tokio::test]
async fn test_namespace_with_separator_is_rejected_by_both_tiers() {
    let store = Arc::new(InProcessStore::new());
    let cache = with_store(store.clone()).await;

    let err = cache
        .set("images:thumbs", "list", &vec!["t.jpg"], TTL, &())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    assert!(cache
        .get::<Vec<String>, _>("images:thumbs", "list", &())
        .await
        .is_err());

    cache.set("images", "list", &vec!["a.jpg"], TTL, &()).await.unwrap();
    cache.set("thumbs", "list", &vec!["t.jpg"], TTL, &()).await.unwrap();
    assert_eq!(cache.clear_namespace("images").await, 1);
    assert_eq!(cache.memory().len(), 1);
    assert_eq!(store.len(), 1);

    let reader = with_store(store.clone()).await;
    let kept: Option<Vec<String>> = reader.get("thumbs", "list", &()).await.unwrap();
    assert_eq!(kept, Some(vec!["t.jpg".to_string()]));
}

#[tokio::test]
async fn test_clear_namespace_leaves_other_namespaces() {
    let store = Arc::new(InProcessStore::new());
    let cache = with_store(store.clone()).await;

    for id in ["a", "b", "c"] {
        cache
            .set("images", "list", &vec![id], TTL, &json!({"folder_id": id}))
            .await
            .unwrap();
    }
    cache
        .set("folders", "list", &folders(), TTL, &json!({"root_id": "R"}))
        .await
        .unwrap();
    assert_eq!(store.len(), 4);

    assert_eq!(cache.clear_namespace("images").await, 3);
    assert_eq!(cache.memory().len(), 1);
    assert_eq!(store.len(), 1);

    let kept: Option<Vec<Folder>> = cache
        .get("folders", "list", &json!({"root_id": "R"}))
        .await
        .unwrap();
    assert_eq!(kept, Some(folders()));
    let gone: Option<Vec<String>> = cache
        .get("images", "list", &json!({"folder_id": "a"}))
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_distributed_hit_backfills_memory() {
    let store = Arc::new(InProcessStore::new());
    let writer = with_store(store.clone()).await;
    let reader = with_store(store.clone()).await;
    let params = json!({"folder_id": "F"});

    writer
        .set("encodings", "face_data", &vec![0.25_f64, -1.5], TTL, &params)
        .await
        .unwrap();
    assert!(reader.memory().is_empty());

    let got: Option<Vec<f64>> = reader.get("encodings", "face_data", &params).await.unwrap();
    assert_eq!(got, Some(vec![0.25, -1.5]));
    assert_eq!(reader.memory().len(), 1);
    assert_eq!(reader.statistics().hits, 1);

    // Served from memory now, even once the store forgets it.
    store.delete(&derive_key("encodings", "face_data", &params).unwrap()).await.unwrap();
    let again: Option<Vec<f64>> = reader.get("encodings", "face_data", &params).await.unwrap();
    assert_eq!(again, Some(vec![0.25, -1.5]));
    assert_eq!(reader.statistics().hits, 2);
}

#[tokio::test]
async fn test_undecodable_distributed_entry_is_a_miss() {
    let store = Arc::new(InProcessStore::new());
    let writer = with_store(store.clone()).await;
    let reader = with_store(store.clone()).await;
    let params = json!({"root_id": "R"});

    writer
        .set("folders", "list", &folders(), TTL, &params)
        .await
        .unwrap();
    // Overwrite the stored blob with bytes the codec cannot read.
    let key = derive_key("folders", "list", &params).unwrap();
    store
        .set_with_ttl(&key, b"definitely not gzip", TTL)
        .await
        .unwrap();

    let got: Option<Vec<Folder>> = reader.get("folders", "list", &params).await.unwrap();
    assert!(got.is_none());
    assert!(reader.memory().is_empty());
    let stats = reader.statistics();
    assert_eq!((stats.hits, stats.misses), (0, 1));
}

#[tokio::test]
async fn test_memory_copy_outlives_distributed_ttl() {
    let store = Arc::new(InProcessStore::new());
    let cache = with_store(store.clone()).await;

    // Sub-second TTLs are clamped to one second by the adapter.
    cache
        .set("images", "list", &vec!["a.jpg"], Duration::from_millis(10), &())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(store.is_empty());

    let got: Option<Vec<String>> = cache.get("images", "list", &()).await.unwrap();
    assert_eq!(got, Some(vec!["a.jpg".to_string()]));
}

#[tokio::test]
async fn test_delete_removes_both_tiers() {
    let store = Arc::new(InProcessStore::new());
    let cache = with_store(store.clone()).await;
    let params = json!({"root_id": "R"});

    cache.set_default("folders", "list", &folders(), &params).await.unwrap();
    assert_eq!(store.len(), 1);
    cache.delete("folders", "list", &params).await.unwrap();
    assert!(store.is_empty());
    assert!(cache.memory().is_empty());

    // Deleting something that was never stored is fine.
    cache.delete("folders", "list", &params).await.unwrap();
}

#[tokio::test]
async fn test_failing_store_degrades_to_memory() {
    let store = Arc::new(FailingStore::default());
    let cache = CacheManager::builder()
        .distributed(store.clone())
        .build()
        .await
        .unwrap();
    let params = json!({"folder_id": "F"});

    let miss: Option<Vec<String>> = cache.get("images", "list", &params).await.unwrap();
    assert!(miss.is_none());
    cache
        .set("images", "list", &vec!["a.jpg"], TTL, &params)
        .await
        .unwrap();
    let hit: Option<Vec<String>> = cache.get("images", "list", &params).await.unwrap();
    assert_eq!(hit, Some(vec!["a.jpg".to_string()]));
    cache.delete("images", "list", &params).await.unwrap();
    assert_eq!(cache.clear_namespace("images").await, 0);

    // get (miss), set, delete, clear each reached the store once.
    assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    let stats = cache.statistics();
    assert_eq!((stats.hits, stats.misses), (1, 1));
    assert!(stats.distributed_available);
    assert_eq!(cache.distributed_name(), "failing");
}

#[tokio::test]
async fn test_unreachable_redis_falls_back_to_memory_only() {
    let config = CacheConfig::new()
        .with_distributed_url("redis://127.0.0.1:1/0")
        .with_call_timeout(Some(Duration::from_millis(500)));
    let cache = CacheManager::builder().config(config).build().await.unwrap();

    assert!(!cache.statistics().distributed_available);
    assert_eq!(cache.distributed_name(), "null");
    cache.set("folders", "list", &folders(), TTL, &()).await.unwrap();
    let got: Option<Vec<Folder>> = cache.get("folders", "list", &()).await.unwrap();
    assert_eq!(got, Some(folders()));
}

#[tokio::test]
async fn test_invalid_config_fails_build() {
    let config = CacheConfig::new().with_memory(MemoryTierConfig::new().with_max_items(0));
    let err = CacheManager::builder()
        .config(config)
        .build()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(
        err.context().and_then(|c| c.field_path.as_deref()),
        Some("memory.max_items")
    );
}

#[tokio::test]
async fn test_memory_tier_stays_bounded_through_manager() {
    let cache = CacheManager::memory_only(MemoryTierConfig::new().with_max_items(50)).unwrap();
    for i in 0..500 {
        cache
            .set("images", "list", &i, TTL, &json!({"folder_id": i}))
            .await
            .unwrap();
        assert!(cache.memory().len() <= 50);
    }
}

#[tokio::test]
async fn test_concurrent_callers_share_one_manager() {
    let cache = Arc::new(with_store(Arc::new(InProcessStore::new())).await);
    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let params = json!({"folder_id": i % 4});
                cache
                    .set("images", "list", &vec![i], TTL, &params)
                    .await
                    .unwrap();
                cache
                    .get::<Vec<i32>, _>("images", "list", &params)
                    .await
                    .unwrap()
            })
        })
        .collect();
    for t in tasks {
        assert!(t.await.unwrap().is_some());
    }
    assert_eq!(cache.memory().len(), 4);
    assert_eq!(cache.statistics().hits, 16);
}
