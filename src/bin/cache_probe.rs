//! Operator probe: builds a cache manager the way the backend does, runs one
//! set/get/clear round against it and prints the resulting statistics.
//!
//! Configuration is read from `CACHE_CONFIG` (optional YAML file) and then the
//! environment (`REDIS_URL`, `CACHE_MAX_ITEMS`, ...). Log level via `RUST_LOG`.

use photo_cache::cache::{CacheManager, FolderCache};
use photo_cache::config::CacheConfig;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const PROBE_NAMESPACE: &str = "cache-probe";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("CACHE_CONFIG") {
        Ok(path) => CacheConfig::from_yaml_file(&path)?,
        Err(_) => CacheConfig::default(),
    }
    .overlay(|k| std::env::var(k).ok());

    let cache = Arc::new(CacheManager::builder().config(config).build().await?);
    println!("distributed tier: {}", cache.distributed_name());

    let params = json!({"probe": true});
    let before = cache.get_value(PROBE_NAMESPACE, "ping", &params).await?;
    println!("initial lookup: {}", if before.is_some() { "hit" } else { "miss" });

    cache
        .set(
            PROBE_NAMESPACE,
            "ping",
            &json!({"pong": std::process::id()}),
            std::time::Duration::from_secs(60),
            &params,
        )
        .await?;
    let after = cache.get_value(PROBE_NAMESPACE, "ping", &params).await?;
    println!("lookup after set: {}", if after.is_some() { "hit" } else { "miss" });

    let folders = FolderCache::new(cache.clone());
    folders.set_folders("probe-root", &[json!({"id": "f1"})]).await?;
    let listed: Option<Vec<serde_json::Value>> = folders.get_folders("probe-root").await?;
    println!("folder facade round trip: {}", listed.is_some());
    folders.invalidate_folders("probe-root").await?;

    let cleared = cache.clear_namespace(PROBE_NAMESPACE).await;
    println!("cleared {} memory entries", cleared);

    let stats = cache.statistics();
    println!(
        "hits={} misses={} hit_rate={:.2}% memory_items={} distributed_available={}",
        stats.hits,
        stats.misses,
        stats.hit_rate(),
        stats.memory_items,
        stats.distributed_available
    );
    Ok(())
}
