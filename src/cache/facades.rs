//! Per-domain wrappers with fixed namespace, key and default TTL.

use super::manager::CacheManager;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One `(namespace, key, id parameter, default TTL)` slot.
#[derive(Debug, Clone, Copy)]
struct Slot {
    namespace: &'static str,
    key: &'static str,
    id_param: &'static str,
    ttl: Duration,
}

impl Slot {
    fn params<'a>(&self, id: &'a str) -> BTreeMap<&'static str, &'a str> {
        BTreeMap::from([(self.id_param, id)])
    }

    async fn get<T: DeserializeOwned>(
        &self,
        cache: &CacheManager,
        id: &str,
    ) -> Result<Option<Vec<T>>> {
        cache.get(self.namespace, self.key, &self.params(id)).await
    }

    async fn set<T: Serialize>(
        &self,
        cache: &CacheManager,
        id: &str,
        items: &[T],
        ttl: Duration,
    ) -> Result<()> {
        cache
            .set(self.namespace, self.key, items, ttl, &self.params(id))
            .await
    }

    async fn invalidate(&self, cache: &CacheManager, id: &str) -> Result<()> {
        cache.delete(self.namespace, self.key, &self.params(id)).await
    }
}

const FOLDERS: Slot = Slot {
    namespace: "folders",
    key: "list",
    id_param: "root_id",
    ttl: Duration::from_secs(1800),
};

const IMAGES: Slot = Slot {
    namespace: "images",
    key: "list",
    id_param: "folder_id",
    ttl: Duration::from_secs(3600),
};

const ENCODINGS: Slot = Slot {
    namespace: "encodings",
    key: "face_data",
    id_param: "folder_id",
    ttl: Duration::from_secs(7200),
};

/// Folder listings under a drive root. Namespace `folders`, default TTL 30 minutes.
#[derive(Clone)]
pub struct FolderCache {
    cache: Arc<CacheManager>,
}

impl FolderCache {
    pub const NAMESPACE: &'static str = FOLDERS.namespace;
    pub const DEFAULT_TTL: Duration = FOLDERS.ttl;

    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub async fn get_folders<T: DeserializeOwned>(
        &self,
        root_folder_id: &str,
    ) -> Result<Option<Vec<T>>> {
        FOLDERS.get(&self.cache, root_folder_id).await
    }

    pub async fn set_folders<T: Serialize>(
        &self,
        root_folder_id: &str,
        folders: &[T],
    ) -> Result<()> {
        self.set_folders_with_ttl(root_folder_id, folders, FOLDERS.ttl).await
    }

    pub async fn set_folders_with_ttl<T: Serialize>(
        &self,
        root_folder_id: &str,
        folders: &[T],
        ttl: Duration,
    ) -> Result<()> {
        FOLDERS.set(&self.cache, root_folder_id, folders, ttl).await
    }

    pub async fn invalidate_folders(&self, root_folder_id: &str) -> Result<()> {
        FOLDERS.invalidate(&self.cache, root_folder_id).await
    }
}

/// Image listings of one folder. Namespace `images`, default TTL 1 hour.
#[derive(Clone)]
pub struct ImageCache {
    cache: Arc<CacheManager>,
}

impl ImageCache {
    pub const NAMESPACE: &'static str = IMAGES.namespace;
    pub const DEFAULT_TTL: Duration = IMAGES.ttl;

    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub async fn get_images<T: DeserializeOwned>(
        &self,
        folder_id: &str,
    ) -> Result<Option<Vec<T>>> {
        IMAGES.get(&self.cache, folder_id).await
    }

    pub async fn set_images<T: Serialize>(&self, folder_id: &str, images: &[T]) -> Result<()> {
        self.set_images_with_ttl(folder_id, images, IMAGES.ttl).await
    }

    pub async fn set_images_with_ttl<T: Serialize>(
        &self,
        folder_id: &str,
        images: &[T],
        ttl: Duration,
    ) -> Result<()> {
        IMAGES.set(&self.cache, folder_id, images, ttl).await
    }

    pub async fn invalidate_images(&self, folder_id: &str) -> Result<()> {
        IMAGES.invalidate(&self.cache, folder_id).await
    }
}

/// Face encodings computed for one folder. Namespace `encodings`, default TTL 2 hours.
#[derive(Clone)]
pub struct EncodingCache {
    cache: Arc<CacheManager>,
}

impl EncodingCache {
    pub const NAMESPACE: &'static str = ENCODINGS.namespace;
    pub const DEFAULT_TTL: Duration = ENCODINGS.ttl;

    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub async fn get_encodings<T: DeserializeOwned>(
        &self,
        folder_id: &str,
    ) -> Result<Option<Vec<T>>> {
        ENCODINGS.get(&self.cache, folder_id).await
    }

    pub async fn set_encodings<T: Serialize>(
        &self,
        folder_id: &str,
        encodings: &[T],
    ) -> Result<()> {
        self.set_encodings_with_ttl(folder_id, encodings, ENCODINGS.ttl)
            .await
    }

    pub async fn set_encodings_with_ttl<T: Serialize>(
        &self,
        folder_id: &str,
        encodings: &[T],
        ttl: Duration,
    ) -> Result<()> {
        ENCODINGS.set(&self.cache, folder_id, encodings, ttl).await
    }

    pub async fn invalidate_encodings(&self, folder_id: &str) -> Result<()> {
        ENCODINGS.invalidate(&self.cache, folder_id).await
    }
}
