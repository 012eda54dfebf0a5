//! Cache manager.

use super::codec::Codec;
use super::distributed::{DistributedAdapter, DistributedTier, NullTier};
use super::key::{self, CacheKey};
use super::memory::MemoryTier;
use crate::config::{redact_url, CacheConfig, MemoryTierConfig};
use crate::Result;
#[cfg(feature = "redis")]
use crate::Error;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// TTL used by [`CacheManager::set_default`].
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Point-in-time view of cache counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub memory_items: usize,
    pub distributed_available: bool,
}

impl CacheStatistics {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit rate as a percentage rounded to two decimals; `0.0` before any request.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64 * 10_000.0).round() / 100.0
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

/// Two-tier cache: a bounded in-process map in front of an optional distributed store.
///
/// Reads check memory first, then the distributed tier (backfilling memory on a hit).
/// Writes go to memory synchronously and to the distributed tier best-effort. The
/// memory tier keeps no TTL: an entry outlives its distributed copy until capacity
/// pressure evicts it.
///
/// Build one per process and share it as `Arc<CacheManager>`.
pub struct CacheManager {
    memory: MemoryTier,
    distributed: DistributedAdapter,
    codec: Codec,
    stats: AtomicStats,
}

impl CacheManager {
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::new()
    }

    /// Memory-only manager; the distributed tier is the null tier.
    ///
    /// Fails only if `memory` does not validate.
    pub fn memory_only(memory: MemoryTierConfig) -> Result<Self> {
        Ok(Self::from_parts(
            MemoryTier::new(memory)?,
            DistributedAdapter::null(),
            Codec::default(),
        ))
    }

    fn from_parts(memory: MemoryTier, distributed: DistributedAdapter, codec: Codec) -> Self {
        Self {
            memory,
            distributed,
            codec,
            stats: AtomicStats::new(),
        }
    }

    /// Look up `(namespace, key, params)`.
    ///
    /// Only a params serialization failure is returned as an error. A stored value that
    /// does not deserialize into `T` is logged, counted as a miss and reported as `None`.
    pub async fn get<T, P>(&self, namespace: &str, key: &str, params: &P) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let cache_key = key::derive(namespace, key, params)?;
        let found = match self.lookup(&cache_key).await {
            Some(value) => match serde_json::from_value(value) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(%cache_key, error = %e, "cached value has unexpected shape");
                    None
                }
            },
            None => None,
        };
        self.record(found.is_some());
        Ok(found)
    }

    /// Untyped lookup returning the stored JSON value.
    pub async fn get_value<P>(
        &self,
        namespace: &str,
        key: &str,
        params: &P,
    ) -> Result<Option<Value>>
    where
        P: Serialize + ?Sized,
    {
        let cache_key = key::derive(namespace, key, params)?;
        let found = self.lookup(&cache_key).await;
        self.record(found.is_some());
        Ok(found)
    }

    fn record(&self, hit: bool) {
        let counter = if hit {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Memory, then the distributed tier with backfill. Statistics are left to the caller.
    async fn lookup(&self, cache_key: &CacheKey) -> Option<Value> {
        if let Some(v) = self.memory.get(cache_key) {
            tracing::debug!(%cache_key, "memory cache hit");
            return Some(v);
        }

        if self.distributed.is_available() {
            if let Some(bytes) = self.distributed.get(cache_key).await {
                match self.codec.decode::<Value>(&bytes) {
                    Ok(v) => {
                        self.memory.put(cache_key.clone(), v.clone());
                        tracing::debug!(
                            %cache_key,
                            backend = self.distributed.name(),
                            "distributed cache hit, backfilled memory"
                        );
                        return Some(v);
                    }
                    Err(e) => {
                        tracing::warn!(%cache_key, error = %e, "discarding undecodable cache entry");
                    }
                }
            }
        }

        None
    }

    /// Store `value` under `(namespace, key, params)`.
    ///
    /// `ttl` applies to the distributed copy only. Errors only if `params` or `value`
    /// cannot be represented as JSON.
    pub async fn set<T, P>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
        params: &P,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        let cache_key = key::derive(namespace, key, params)?;
        let value = serde_json::to_value(value)?;

        if self.distributed.is_available() {
            // Encode before the value moves into memory; a codec failure only skips
            // the distributed write.
            let encoded = self.codec.encode(&value);
            self.memory.put(cache_key.clone(), value);
            match encoded {
                Ok(bytes) => {
                    if self.distributed.set_with_ttl(&cache_key, &bytes, ttl).await {
                        tracing::debug!(
                            %cache_key,
                            ttl_secs = ttl.as_secs(),
                            "stored in distributed cache"
                        );
                    }
                }
                Err(e) => tracing::warn!(%cache_key, error = %e, "skipping distributed write"),
            }
        } else {
            self.memory.put(cache_key, value);
        }
        Ok(())
    }

    /// [`set`](Self::set) with [`DEFAULT_TTL`].
    pub async fn set_default<T, P>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        params: &P,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        self.set(namespace, key, value, DEFAULT_TTL, params).await
    }

    /// Remove `(namespace, key, params)` from both tiers.
    pub async fn delete<P>(&self, namespace: &str, key: &str, params: &P) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        let cache_key = key::derive(namespace, key, params)?;
        self.memory.delete(&cache_key);
        self.distributed.delete(&cache_key).await;
        Ok(())
    }

    /// Remove every entry derived under `namespace` from both tiers.
    ///
    /// Returns the number of memory entries removed.
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let removed = self.memory.clear_namespace(namespace);
        let remote = self.distributed.delete_by_prefix(namespace).await;
        tracing::debug!(namespace, memory = removed, distributed = ?remote, "cleared namespace");
        removed
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            memory_items: self.memory.len(),
            distributed_available: self.distributed.is_available(),
        }
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn distributed_name(&self) -> &'static str {
        self.distributed.name()
    }
}

/// Builds a [`CacheManager`], choosing the distributed tier at construction time.
///
/// Selection order: an injected tier, else Redis when a URL is configured and
/// reachable, else the null tier. Store problems never fail `build`; only invalid
/// configuration does.
pub struct CacheManagerBuilder {
    config: CacheConfig,
    tier: Option<Arc<dyn DistributedTier>>,
}

impl CacheManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            tier: None,
        }
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn memory(mut self, memory: MemoryTierConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Use this store instead of connecting to `distributed.url`.
    pub fn distributed(mut self, tier: Arc<dyn DistributedTier>) -> Self {
        self.tier = Some(tier);
        self
    }

    pub async fn build(self) -> Result<CacheManager> {
        self.config.validate()?;
        let CacheConfig {
            memory,
            distributed,
        } = self.config;

        let tier = match self.tier {
            Some(tier) => tier,
            None => {
                connect_configured(distributed.url.as_deref(), distributed.call_timeout()).await
            }
        };
        if tier.is_available() {
            tracing::info!(backend = tier.name(), "distributed cache enabled");
        }
        let adapter =
            DistributedAdapter::new(tier, distributed.pool_size, distributed.call_timeout());
        Ok(CacheManager::from_parts(
            MemoryTier::new(memory)?,
            adapter,
            Codec::new(distributed.compression_level),
        ))
    }
}

impl Default for CacheManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect_configured(
    url: Option<&str>,
    timeout: Option<Duration>,
) -> Arc<dyn DistributedTier> {
    match url {
        Some(url) => connect_redis(url, timeout).await,
        None => {
            tracing::info!("no distributed cache configured, using memory cache only");
            Arc::new(NullTier)
        }
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str, timeout: Option<Duration>) -> Arc<dyn DistributedTier> {
    let connect = super::redis_tier::RedisTier::connect(url);
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .unwrap_or_else(|_| {
                Err(Error::unavailable(
                    "redis",
                    format!("connect timed out after {:?}", limit),
                ))
            }),
        None => connect.await,
    };
    match outcome {
        Ok(tier) => {
            tracing::info!(url = tier.url(), "redis cache connected");
            Arc::new(tier)
        }
        Err(e) => {
            tracing::warn!(
                url = %redact_url(url),
                error = %e,
                "redis not available, using memory cache only"
            );
            Arc::new(NullTier)
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(url: &str, _timeout: Option<Duration>) -> Arc<dyn DistributedTier> {
    tracing::warn!(
        url = %redact_url(url),
        "redis support not compiled in, using memory cache only"
    );
    Arc::new(NullTier)
}
