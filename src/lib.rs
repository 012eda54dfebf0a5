//! # photo-cache
//!
//! Tiered cache for the photo-search backend: folder listings, image listings and face
//! encodings are kept in a bounded in-process tier, optionally backed by Redis.
//!
//! ## Overview
//!
//! The drive sync pipeline and the HTTP routes talk to one [`cache::CacheManager`]
//! built at startup and shared as `Arc<CacheManager>`. The distributed tier is
//! optional: when Redis is not configured or not reachable, the manager runs on the
//! memory tier alone and every operation keeps working.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Key derivation, codec, tiers, manager, memoization, facades |
//! | [`config`] | Configuration from defaults, YAML and environment |
//! | [`error`] | Error type and structured context |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photo_cache::cache::{CacheManager, FolderCache};
//! use photo_cache::config::CacheConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> photo_cache::Result<()> {
//!     let cache = Arc::new(
//!         CacheManager::builder()
//!             .config(CacheConfig::from_env())
//!             .build()
//!             .await?,
//!     );
//!
//!     let folders = FolderCache::new(cache.clone());
//!     folders.set_folders("root", &["2024-wedding", "2024-portraits"]).await?;
//!     let cached: Option<Vec<String>> = folders.get_folders("root").await?;
//!     assert!(cached.is_some());
//!
//!     println!("{:?}", cache.statistics());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheManager, CacheStatistics};
pub use config::CacheConfig;
pub use error::{Error, ErrorContext};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
