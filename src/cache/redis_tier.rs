//! Redis-backed distributed tier.

use super::distributed::DistributedTier;
use super::key::CacheKey;
use crate::config::redact_url;
use crate::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

const DEL_BATCH: usize = 500;

/// [`DistributedTier`] over a Redis connection manager.
///
/// The manager multiplexes one connection and reconnects on its own after a drop;
/// calls made while the server is away fail and are absorbed by the adapter.
pub struct RedisTier {
    conn: ConnectionManager,
    url: String,
}

impl RedisTier {
    /// Open a connection and confirm it with `PING`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let mut conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(Self {
            conn,
            url: redact_url(url),
        })
    }

    /// Connection URL with any password masked.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn unavailable(e: redis::RedisError) -> Error {
    Error::unavailable("redis", e.to_string())
}

/// Escape glob metacharacters so a namespace matches literally in `SCAN MATCH`.
pub(crate) fn glob_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl DistributedTier for RedisTier {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key.as_str())
            .await
            .map_err(unavailable)
    }

    async fn set_with_ttl(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key.as_str(), value, ttl.as_secs().max(1))
            .await
            .map_err(unavailable)
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key.as_str()).await.map_err(unavailable)
    }

    async fn delete_by_prefix(&self, namespace: &str) -> Result<usize> {
        let pattern = format!("{}:*", glob_escape(namespace));
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(unavailable)?;
            while let Some(k) = iter.next_item().await {
                keys.push(k);
            }
        }
        // SCAN may report a key more than once.
        keys.sort_unstable();
        keys.dedup();

        let mut removed = 0;
        for batch in keys.chunks(DEL_BATCH) {
            removed += conn
                .del::<_, usize>(batch.to_vec())
                .await
                .map_err(unavailable)?;
        }
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
