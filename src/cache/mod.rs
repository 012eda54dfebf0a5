//! # Tiered Cache
//!
//! A bounded in-process tier in front of an optional distributed key-value store,
//! with namespaced keys, compressed distributed payloads, hit/miss statistics and
//! function memoization.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Caller-facing get/set/delete/clear-namespace over both tiers |
//! | [`CacheManagerBuilder`] | Picks the distributed tier at construction time |
//! | [`MemoryTier`] | Bounded map with frequency-then-age eviction |
//! | [`DistributedTier`] | Trait for external stores with expiring keys |
//! | [`DistributedAdapter`] | Pool, timeout and failure-absorbing policy around a store |
//! | [`RedisTier`] | Redis store (feature `redis`) |
//! | [`InProcessStore`] / [`NullTier`] | In-process expiring store / no-op store |
//! | [`Codec`] | JSON + gzip payload encoding for the distributed tier |
//! | [`Memoize`] | Cache-through wrapper for sync and async functions |
//! | [`FolderCache`], [`ImageCache`], [`EncodingCache`] | Fixed-namespace facades |
//!
//! ## Lookup order
//!
//! `get` checks memory, then the distributed tier; a distributed hit is copied into
//! memory. `set` writes memory, then the distributed tier with a TTL. Distributed
//! failures are logged and treated as misses or no-ops, so a cache outage only costs
//! recomputation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use photo_cache::cache::CacheManager;
//! use photo_cache::config::CacheConfig;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn run() -> photo_cache::Result<()> {
//! let cache = CacheManager::builder()
//!     .config(CacheConfig::from_env())
//!     .build()
//!     .await?;
//!
//! let params = json!({"root_id": "R"});
//! if cache.get::<Vec<String>, _>("folders", "list", &params).await?.is_none() {
//!     let folders = vec!["f1".to_string()];
//!     cache
//!         .set("folders", "list", &folders, Duration::from_secs(1800), &params)
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

mod codec;
mod distributed;
mod facades;
mod key;
mod manager;
mod memoize;
mod memory;
#[cfg(feature = "redis")]
mod redis_tier;

pub use codec::Codec;
pub use distributed::{DistributedAdapter, DistributedTier, InProcessStore, NullTier};
pub use facades::{EncodingCache, FolderCache, ImageCache};
pub use key::{derive as derive_key, CacheKey};
pub use manager::{CacheManager, CacheManagerBuilder, CacheStatistics, DEFAULT_TTL};
pub use memoize::{Memoize, Memoized};
pub use memory::MemoryTier;
#[cfg(feature = "redis")]
pub use redis_tier::RedisTier;
