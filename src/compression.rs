//! LZ4 framing for persisted state files
//!
//! States are JSON documents that repeat the same keys for every file, so
//! they compress very well with LZ4 at almost no CPU cost.
//!
//! ## Format
//!
//! Every stored blob starts with a 4-byte header:
//! - `LZ4S`: LZ4 data with a prepended little-endian size follows
//! - `\0\0\0\0`: raw data follows
//!
//! Raw framing is used when compression is disabled or does not shrink the
//! payload, so both kinds can coexist in one repository.

use crate::error::{Result, SnapsumError};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use tracing::trace;

const LZ4_MAGIC: &[u8; 4] = b"LZ4S";
const RAW_MAGIC: &[u8; 4] = &[0, 0, 0, 0];

/// Whether state files are compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    /// Store the JSON as is, useful to inspect states by hand
    None,
    /// LZ4 compression (default)
    #[default]
    Fast,
}

/// Compression engine for state blobs
#[derive(Debug, Clone, Copy)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
}

impl CompressionEngine {
    /// Create a new compression engine with the specified strategy
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self { strategy }
    }

    /// Frame `content`, compressing it when the strategy allows and it helps
    pub fn compress(&self, content: &[u8]) -> Vec<u8> {
        if self.strategy == CompressionStrategy::Fast && content.len() >= 64 {
            let compressed = compress_prepend_size(content);
            if compressed.len() < content.len() {
                trace!(
                    "Compressed state blob: {} -> {} bytes",
                    content.len(),
                    compressed.len()
                );
                let mut result = Vec::with_capacity(LZ4_MAGIC.len() + compressed.len());
                result.extend_from_slice(LZ4_MAGIC);
                result.extend_from_slice(&compressed);
                return result;
            }
        }

        let mut result = Vec::with_capacity(RAW_MAGIC.len() + content.len());
        result.extend_from_slice(RAW_MAGIC);
        result.extend_from_slice(content);
        result
    }

    /// Undo [`compress`](Self::compress), whatever strategy wrote the blob
    pub fn decompress(&self, content: &[u8]) -> Result<Vec<u8>> {
        if content.len() < 4 {
            return Err(SnapsumError::decompression("Content too short"));
        }

        let (header, body) = content.split_at(4);
        if header == LZ4_MAGIC {
            decompress_size_prepended(body).map_err(|e| {
                SnapsumError::decompression(format!("LZ4 decompression failed: {}", e))
            })
        } else if header == RAW_MAGIC {
            Ok(body.to_vec())
        } else {
            Err(SnapsumError::decompression(format!(
                "Unknown header {:02x?}",
                header
            )))
        }
    }
}
