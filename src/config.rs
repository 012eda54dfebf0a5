//! Cache configuration.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an optional YAML
//! file, and environment variables:
//!
//! | Field | Default | Env |
//! |-------|---------|-----|
//! | `memory.max_items` | 1000 | `CACHE_MAX_ITEMS` |
//! | `memory.evict_fraction` | 0.2 | `CACHE_EVICT_FRACTION` |
//! | `distributed.url` | unset (memory-only) | `REDIS_URL` |
//! | `distributed.pool_size` | 4 | `CACHE_POOL_SIZE` |
//! | `distributed.call_timeout_ms` | 2000, `0` disables | `CACHE_CALL_TIMEOUT_MS` |
//! | `distributed.compression_level` | 6 | `CACHE_COMPRESSION_LEVEL` |

use crate::{Error, ErrorContext, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_ITEMS: usize = 1000;
pub const DEFAULT_EVICT_FRACTION: f64 = 0.2;
pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Bounds of the in-process tier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryTierConfig {
    /// Entry count above which an eviction pass runs.
    pub max_items: usize,
    /// Share of entries removed by one eviction pass, in (0, 1).
    pub evict_fraction: f64,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            evict_fraction: DEFAULT_EVICT_FRACTION,
        }
    }
}

impl MemoryTierConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_items(mut self, n: usize) -> Self {
        self.max_items = n;
        self
    }
    pub fn with_evict_fraction(mut self, f: f64) -> Self {
        self.evict_fraction = f;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 {
            return Err(Error::configuration_with_context(
                "max_items must be at least 1",
                ErrorContext::new().with_field_path("memory.max_items"),
            ));
        }
        if !(self.evict_fraction > 0.0 && self.evict_fraction < 1.0) {
            return Err(Error::configuration_with_context(
                "evict_fraction must be in (0, 1)",
                ErrorContext::new()
                    .with_field_path("memory.evict_fraction")
                    .with_details(format!("got {}", self.evict_fraction)),
            ));
        }
        Ok(())
    }
}

/// Connection and call policy for the distributed tier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    /// Store URL, e.g. `redis://localhost:6379`. `None` runs memory-only.
    pub url: Option<String>,
    /// Maximum number of distributed calls in flight at once.
    pub pool_size: usize,
    /// Per-call timeout in milliseconds; `0` disables the timeout.
    pub call_timeout_ms: u64,
    /// gzip level for stored payloads (0-9).
    pub compression_level: u32,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: DEFAULT_POOL_SIZE,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl DistributedConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::configuration_with_context(
                "pool_size must be at least 1",
                ErrorContext::new().with_field_path("distributed.pool_size"),
            ));
        }
        if self.compression_level > 9 {
            return Err(Error::configuration_with_context(
                "compression_level must be between 0 and 9",
                ErrorContext::new()
                    .with_field_path("distributed.compression_level")
                    .with_details(format!("got {}", self.compression_level)),
            ));
        }
        Ok(())
    }
}

/// Complete cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory: MemoryTierConfig,
    pub distributed: DistributedConfig,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, memory: MemoryTierConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_distributed_url(mut self, url: impl Into<String>) -> Self {
        self.distributed.url = Some(url.into());
        self
    }

    pub fn with_pool_size(mut self, n: usize) -> Self {
        self.distributed.pool_size = n;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.distributed.call_timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        self
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().overlay(|k| std::env::var(k).ok())
    }

    /// Defaults overlaid with values from `lookup` (same keys as the environment).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().overlay(lookup)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: CacheConfig = serde_yaml::from_str(s)?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Apply environment-style overrides on top of `self`.
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "CACHE_MAX_ITEMS") {
            self.memory.max_items = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_EVICT_FRACTION") {
            self.memory.evict_fraction = v;
        }
        if let Some(url) = lookup("REDIS_URL").filter(|s| !s.trim().is_empty()) {
            self.distributed.url = Some(url.trim().to_string());
        }
        if let Some(v) = parse_var(&lookup, "CACHE_POOL_SIZE") {
            self.distributed.pool_size = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_CALL_TIMEOUT_MS") {
            self.distributed.call_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_COMPRESSION_LEVEL") {
            self.distributed.compression_level = v;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.memory.validate()?;
        self.distributed.validate()
    }
}

/// Render a store URL for logs with any password masked.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable cache setting");
            None
        }
    }
}
