//! In-process tier.
//!
//! Entries carry no TTL. When the tier grows past `max_items`, the lowest-ranked
//! `evict_fraction` of entries is dropped, ranked by `(access_count, stored_at)`: least
//! used first, oldest first among equals. Fresh entries start at `access_count == 1`, so
//! they are eviction candidates alongside every other entry that was never read.

use super::key::CacheKey;
use crate::config::MemoryTierConfig;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    stored_at: Instant,
    // Insertion sequence; breaks ties between entries stored within the same clock tick.
    seq: u64,
    access_count: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, MemoryEntry>,
    next_seq: u64,
}

/// Bounded map from [`CacheKey`] to value, guarded by a single mutex.
///
/// Every operation, including the eviction scan, runs under one lock acquisition.
pub struct MemoryTier {
    inner: Mutex<Inner>,
    config: MemoryTierConfig,
}

impl MemoryTier {
    /// Fails with [`Error::Configuration`](crate::Error::Configuration) when `max_items`
    /// is zero or `evict_fraction` is outside `(0, 1)`.
    pub fn new(config: MemoryTierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: MemoryTierConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a clone of the value and bumps its access count.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(key)?;
        entry.access_count += 1;
        Some(entry.value.clone())
    }

    /// Insert or overwrite; the entry restarts at `access_count == 1`.
    ///
    /// Returns the number of entries evicted by the capacity check that follows.
    pub fn put(&self, key: CacheKey, value: Value) -> usize {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            MemoryEntry {
                value,
                stored_at: Instant::now(),
                seq,
                access_count: 1,
            },
        );
        self.evict_locked(&mut inner)
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Remove every entry derived under `namespace`. Returns how many were removed.
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| k.namespace() != namespace);
        before - inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Current access count, without counting as an access.
    pub fn access_count(&self, key: &CacheKey) -> Option<u64> {
        self.lock().entries.get(key).map(|e| e.access_count)
    }

    /// Run the capacity check on demand. `put` already runs it after every insert.
    pub fn evict_if_over_capacity(&self) -> usize {
        let mut inner = self.lock();
        self.evict_locked(&mut inner)
    }

    fn evict_locked(&self, inner: &mut Inner) -> usize {
        let len = inner.entries.len();
        let max = self.config.max_items;
        if len <= max {
            return 0;
        }
        let by_fraction = (len as f64 * self.config.evict_fraction).floor() as usize;
        let remove_count = by_fraction.max(len - max).min(len);

        let mut ranked: Vec<(u64, Instant, u64, CacheKey)> = inner
            .entries
            .iter()
            .map(|(k, e)| (e.access_count, e.stored_at, e.seq, k.clone()))
            .collect();
        ranked.sort_unstable_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
        for (_, _, _, key) in ranked.into_iter().take(remove_count) {
            inner.entries.remove(&key);
        }

        debug_assert!(
            inner.entries.len() <= max,
            "eviction left {} entries with max_items {}",
            inner.entries.len(),
            max
        );
        tracing::debug!(
            evicted = remove_count,
            remaining = inner.entries.len(),
            "memory tier eviction"
        );
        remove_count
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::with_valid_config(MemoryTierConfig::default())
    }
}
