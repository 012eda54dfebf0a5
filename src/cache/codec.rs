//! Payload codec for the distributed tier: JSON, then gzip.

use crate::{Error, ErrorContext, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Encodes values into compressed, self-describing blobs and back.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    level: Compression,
}

impl Codec {
    /// `level` is the gzip level, clamped to 0-9.
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    pub fn encode<T>(&self, value: &T) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2 + 16), self.level);
        encoder
            .write_all(&json)
            .map_err(|e| codec_error("gzip compression failed", e))?;
        encoder
            .finish()
            .map_err(|e| codec_error("gzip compression failed", e))
    }

    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut json = Vec::with_capacity(bytes.len() * 2);
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| codec_error("gzip decompression failed", e))?;
        serde_json::from_slice(&json).map_err(|e| codec_error("payload is not valid JSON", e))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_COMPRESSION_LEVEL)
    }
}

fn codec_error(msg: &str, cause: impl std::fmt::Display) -> Error {
    Error::codec_with_context(
        msg,
        ErrorContext::new()
            .with_details(cause.to_string())
            .with_source("codec"),
    )
}
