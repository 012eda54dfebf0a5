//! Distributed tier: the store trait, its failure-absorbing adapter, and the
//! built-in stores.

use super::key::CacheKey;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// An external key-value store with expiring keys.
///
/// Implementations report failures as [`Error::DistributedUnavailable`]; the
/// [`DistributedAdapter`] turns them into misses and no-ops. Keys are
/// `<namespace>:<digest>`, so `delete_by_prefix` removes everything matching
/// `<namespace>:*`.
#[async_trait]
pub trait DistributedTier: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    /// The store owns expiry; `ttl` is never re-checked client side.
    async fn set_with_ttl(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<()>;
    /// Returns how many keys were removed.
    async fn delete_by_prefix(&self, namespace: &str) -> Result<usize>;
    fn name(&self) -> &'static str;
    /// `false` only for the null tier; lets the manager skip encoding work.
    fn is_available(&self) -> bool {
        true
    }
}

/// Tier used when no store is configured or reachable. Every read misses.
pub struct NullTier;
impl NullTier {
    pub fn new() -> Self {
        Self
    }
}
impl Default for NullTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedTier for NullTier {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set_with_ttl(&self, _: &CacheKey, _: &[u8], _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<()> {
        Ok(())
    }
    async fn delete_by_prefix(&self, _: &str) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
    fn is_available(&self) -> bool {
        false
    }
}

#[derive(Clone)]
struct StoredBlob {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoredBlob {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Expiring key-value store living in this process.
///
/// Honors the same contract as a network store (store-side TTL, prefix delete), which
/// makes it a drop-in for single-node deployments and for exercising the codec path.
pub struct InProcessStore {
    entries: RwLock<HashMap<String, StoredBlob>>,
}

impl InProcessStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Live (unexpired) key count.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InProcessStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedTier for InProcessStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(key.as_str()) {
            if entry.is_expired() {
                entries.remove(key.as_str());
                return Ok(None);
            }
            return Ok(Some(entry.data.clone()));
        }
        Ok(None)
    }
    async fn set_with_ttl(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, e| !e.is_expired());
        entries.insert(
            key.as_str().to_string(),
            StoredBlob {
                data: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
    async fn delete(&self, key: &CacheKey) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key.as_str());
        Ok(())
    }
    async fn delete_by_prefix(&self, namespace: &str) -> Result<usize> {
        let prefix = format!("{}:", namespace);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        Ok(before - entries.len())
    }
    fn name(&self) -> &'static str {
        "in-process"
    }
}

/// Wraps a [`DistributedTier`] with the call policy the manager relies on:
///
/// - at most `pool_size` calls in flight; extra callers wait for a slot
/// - an optional per-call timeout
/// - every failure is logged at `warn` and absorbed (`None` / `false`)
pub struct DistributedAdapter {
    tier: Arc<dyn DistributedTier>,
    pool: Semaphore,
    pool_size: usize,
    timeout: Option<Duration>,
}

impl DistributedAdapter {
    pub fn new(tier: Arc<dyn DistributedTier>, pool_size: usize, timeout: Option<Duration>) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            tier,
            pool: Semaphore::new(pool_size),
            pool_size,
            timeout,
        }
    }

    pub fn null() -> Self {
        Self::new(Arc::new(NullTier), 1, None)
    }

    pub fn is_available(&self) -> bool {
        self.tier.is_available()
    }

    pub fn name(&self) -> &'static str {
        self.tier.name()
    }

    /// Calls currently holding a pool slot.
    pub fn in_flight(&self) -> usize {
        self.pool_size - self.pool.available_permits()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        if !self.is_available() {
            return None;
        }
        self.run("get", key.as_str(), self.tier.get(key))
            .await
            .flatten()
    }

    /// `ttl` is clamped to at least one second.
    pub async fn set_with_ttl(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> bool {
        if !self.is_available() {
            return false;
        }
        let ttl = ttl.max(Duration::from_secs(1));
        self.run("set", key.as_str(), self.tier.set_with_ttl(key, value, ttl))
            .await
            .is_some()
    }

    pub async fn delete(&self, key: &CacheKey) -> bool {
        if !self.is_available() {
            return false;
        }
        self.run("delete", key.as_str(), self.tier.delete(key))
            .await
            .is_some()
    }

    pub async fn delete_by_prefix(&self, namespace: &str) -> Option<usize> {
        if !self.is_available() {
            return None;
        }
        self.run(
            "delete_by_prefix",
            namespace,
            self.tier.delete_by_prefix(namespace),
        )
        .await
    }

    async fn run<T, F>(&self, op: &'static str, target: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _slot = match self.pool.acquire().await {
            Ok(slot) => slot,
            Err(_) => return None,
        };
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(res) => res,
                Err(_) => Err(Error::unavailable(
                    self.tier.name(),
                    format!("{} timed out after {:?}", op, limit),
                )),
            },
            None => call.await,
        };
        match outcome {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    backend = self.tier.name(),
                    op,
                    target,
                    error = %e,
                    "distributed cache call failed, continuing without it"
                );
                None
            }
        }
    }
}
