//! Memoization over [`CacheManager`].
//!
//! [`Memoize`] describes where results go (namespace, TTL, key derivation, invalidation
//! events); [`Memoize::wrap`] and [`Memoize::wrap_sync`] turn a function into a
//! [`Memoized`] callable that consults the cache before running it.
//!
//! There is no single-flight: two concurrent calls that both miss both run the wrapped
//! function and both write the cache, last write wins. That is fine for pure
//! recomputation; functions with side effects need external serialization.
//!
//! ```rust,no_run
//! use photo_cache::cache::{CacheManager, Memoize};
//! use photo_cache::config::MemoryTierConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> photo_cache::Result<()> {
//! let cache = Arc::new(CacheManager::memory_only(MemoryTierConfig::default())?);
//! let count_faces = Memoize::new(cache, "encodings", "count_faces")
//!     .ttl(Duration::from_secs(600))
//!     .wrap(|folder_id: String| async move { folder_id.len() as u32 });
//!
//! let n = count_faces.call("folder-1".to_string()).await?;
//! # Ok(())
//! # }
//! ```

use super::manager::{CacheManager, DEFAULT_TTL};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type KeyFn<A> = Arc<dyn Fn(&A) -> Result<String> + Send + Sync>;

/// Memoization settings for functions taking `A`.
pub struct Memoize<A> {
    cache: Arc<CacheManager>,
    namespace: String,
    name: String,
    ttl: Duration,
    key_fn: KeyFn<A>,
    invalidate_on: HashSet<String>,
}

impl<A> Memoize<A>
where
    A: Serialize,
{
    /// `name` identifies the wrapped function inside `namespace`.
    ///
    /// The key is `"<name>:<JSON of args>"`, which is sensitive to argument order inside
    /// sequences and to any field that changes between otherwise-equal calls. Use
    /// [`Memoize::keyed`] when that is not what you want, or when `A` is not `Serialize`.
    pub fn new(
        cache: Arc<CacheManager>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let prefix = name.clone();
        let key_fn: KeyFn<A> = Arc::new(move |args: &A| -> Result<String> {
            Ok(format!("{}:{}", prefix, serde_json::to_string(args)?))
        });
        Self::with_key_fn(cache, namespace.into(), name, key_fn)
    }
}

impl<A> Memoize<A> {
    /// Like [`new`](Self::new), but the cache key comes from `key_fn`, so `A` can be any
    /// type (client handles, shared state).
    pub fn keyed<F>(
        cache: Arc<CacheManager>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key_fn: F,
    ) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        Self::with_key_fn(
            cache,
            namespace.into(),
            name.into(),
            Arc::new(move |args: &A| Ok(key_fn(args))),
        )
    }

    fn with_key_fn(
        cache: Arc<CacheManager>,
        namespace: String,
        name: String,
        key_fn: KeyFn<A>,
    ) -> Self {
        Self {
            cache,
            namespace,
            name,
            ttl: DEFAULT_TTL,
            key_fn,
            invalidate_on: HashSet::new(),
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replace the key derivation.
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(move |args: &A| Ok(f(args)));
        self
    }

    /// Events that, when passed to [`Memoized::call_with_events`], drop the cached entry
    /// before lookup.
    pub fn invalidate_on<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate_on.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn wrap<F, Fut, R>(self, func: F) -> Memoized<A, F>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = R>,
        R: Serialize + DeserializeOwned,
    {
        Memoized {
            settings: self,
            func,
        }
    }

    /// Wrap a synchronous function. It runs inline on the calling task.
    pub fn wrap_sync<F, R>(self, func: F) -> Memoized<A, impl Fn(A) -> std::future::Ready<R>>
    where
        F: Fn(A) -> R,
        R: Serialize + DeserializeOwned,
    {
        self.wrap(move |args| std::future::ready(func(args)))
    }

    fn key_for(&self, args: &A) -> Result<String> {
        (self.key_fn)(args)
    }
}

/// A function whose results are cached through a [`CacheManager`].
pub struct Memoized<A, F> {
    settings: Memoize<A>,
    func: F,
}

impl<A, F, Fut, R> Memoized<A, F>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = R>,
    R: Serialize + DeserializeOwned,
{
    pub async fn call(&self, args: A) -> Result<R> {
        self.call_with_events(args, &[]).await
    }

    /// Like [`call`](Self::call), but first drops the cached entry if any of `events`
    /// is one this function invalidates on.
    pub async fn call_with_events(&self, args: A, events: &[&str]) -> Result<R> {
        let settings = &self.settings;
        let key = settings.key_for(&args)?;

        if events.iter().any(|e| settings.invalidate_on.contains(*e)) {
            tracing::debug!(
                namespace = %settings.namespace,
                function = %settings.name,
                "invalidating memoized result"
            );
            settings.cache.delete(&settings.namespace, &key, &()).await?;
        }

        let cached = settings
            .cache
            .get::<R, _>(&settings.namespace, &key, &())
            .await?;
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let result = (self.func)(args).await;
        settings
            .cache
            .set(&settings.namespace, &key, &result, settings.ttl, &())
            .await?;
        Ok(result)
    }

    /// Drop the cached result for `args` without calling the function.
    pub async fn invalidate(&self, args: &A) -> Result<()> {
        let key = self.settings.key_for(args)?;
        self.settings
            .cache
            .delete(&self.settings.namespace, &key, &())
            .await
    }
}
