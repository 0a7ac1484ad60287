//! Compression abstractions.
//!
//! The compressed artifact carries no header of its own: the compressor's
//! framing is authoritative and its payload is the canonical container bytes.

use crate::error::{BitpressError, Result};

/// Trait for lossless compression algorithms.
pub trait Compressor: Send + Sync {
    /// Compress data.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data.
    ///
    /// Malformed or truncated input fails with [`BitpressError::Corruption`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Zstd compressor with configurable level.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Highest zstd level; the level artifacts are written with unless told otherwise.
    pub const MAX_LEVEL: i32 = 22;

    /// Create a new Zstd compressor at [`Self::MAX_LEVEL`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_level(Self::MAX_LEVEL)
    }

    /// Create a new Zstd compressor with specified level.
    ///
    /// Level ranges from 1 (fastest) to 22 (best compression).
    #[must_use]
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }

    /// Configured compression level.
    #[must_use]
    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level).map_err(|e| BitpressError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(BitpressError::Corruption("empty input".to_string()));
        }
        zstd::decode_all(data).map_err(|e| BitpressError::Corruption(e.to_string()))
    }
}
