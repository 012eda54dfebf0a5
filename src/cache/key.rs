//! Cache key derivation.

use crate::{Error, Result};
use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Derived cache key: `<namespace>:<32 hex digest>`.
///
/// The digest covers namespace, key and the canonical (sorted-key) JSON of the params.
/// MD5 is used for speed and stability across processes; keys are not secrets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    full: String,
    namespace_len: usize,
}

impl CacheKey {
    pub fn namespace(&self) -> &str {
        &self.full[..self.namespace_len]
    }
    pub fn digest(&self) -> &str {
        &self.full[self.namespace_len + 1..]
    }
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full)
    }
}

/// Derive the key for `(namespace, key, params)`.
///
/// `params` must serialize to a JSON object (or unit / `None`, meaning no params); field
/// order does not matter. Anything else is a [`Error::Serialization`].
///
/// `namespace` must not contain `:`, the separator prefix deletion matches on; such a
/// namespace is rejected with [`Error::Serialization`].
pub fn derive<P>(namespace: &str, key: &str, params: &P) -> Result<CacheKey>
where
    P: Serialize + ?Sized,
{
    if namespace.contains(':') {
        return Err(Error::Serialization(serde::ser::Error::custom(format!(
            "cache namespace must not contain ':', got {:?}",
            namespace
        ))));
    }
    let canonical = canonical_params(params)?;
    let material = format!("{}:{}:{}", namespace, key, canonical);
    let mut hasher = Md5::new();
    hasher.update(material.as_bytes());
    let digest: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    Ok(CacheKey {
        full: format!("{}:{}", namespace, digest),
        namespace_len: namespace.len(),
    })
}

fn canonical_params<P>(params: &P) -> Result<String>
where
    P: Serialize + ?Sized,
{
    let sorted: BTreeMap<String, Value> = match serde_json::to_value(params)? {
        Value::Null => BTreeMap::new(),
        Value::Object(map) => map.into_iter().collect(),
        other => {
            return Err(Error::Serialization(serde::ser::Error::custom(format!(
                "cache params must serialize to a map, got {}",
                json_kind(&other)
            ))))
        }
    };
    Ok(serde_json::to_string(&sorted)?)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
