//! Dataset codec.
//!
//! Wraps the canonical container serialization in zstd. Compression is
//! lossless over the canonical bytes, so all precision loss happens earlier in
//! the reduction pipeline.

use bitpress_core::compression::{Compressor, ZstdCompressor};
use bitpress_core::Result;
use serde::Serialize;

use crate::container;
use crate::dataset::Dataset;

/// Configuration for the dataset codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Zstd compression level (1-22, default 22)
    pub zstd_level: i32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::best()
    }
}

impl CodecConfig {
    /// Create config optimized for compression speed.
    #[must_use]
    pub fn fast() -> Self {
        Self { zstd_level: 3 }
    }

    /// Create config optimized for compression ratio.
    #[must_use]
    pub fn best() -> Self {
        Self {
            zstd_level: ZstdCompressor::MAX_LEVEL,
        }
    }

    /// Create config with custom zstd level.
    #[must_use]
    pub fn with_level(level: i32) -> Self {
        Self { zstd_level: level }
    }
}

/// Size accounting for a single compress or decompress operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionStats {
    /// Size of the canonical (uncompressed) serialization in bytes
    pub original_size: usize,
    /// Size of the compressed artifact in bytes
    pub compressed_size: usize,
    /// original_size / compressed_size
    pub ratio: f64,
}

impl CompressionStats {
    #[must_use]
    pub fn new(original_size: usize, compressed_size: usize) -> Self {
        Self {
            original_size,
            compressed_size,
            ratio: DatasetCodec::compression_ratio(original_size, compressed_size),
        }
    }
}

/// Lossless dataset codec: canonical container bytes through zstd.
///
/// # Example
/// ```
/// use bitpress::codec::{CodecConfig, DatasetCodec};
/// use bitpress::dataset::{Dataset, Variable, VariableData};
/// use ndarray::{ArrayD, IxDyn};
///
/// let mut ds = Dataset::new();
/// let data = VariableData::Float32(ArrayD::from_elem(IxDyn(&[4, 4]), 1.5f32));
/// ds.add_variable("x", Variable::new(["a", "b"], data).unwrap()).unwrap();
///
/// let codec = DatasetCodec::new(CodecConfig::fast());
/// let compressed = codec.compress(&ds).unwrap();
/// let restored = codec.decompress_dataset(&compressed).unwrap();
/// assert!(restored.variable("x").unwrap().data().bit_eq(ds.variable("x").unwrap().data()));
/// ```
pub struct DatasetCodec {
    config: CodecConfig,
    compressor: ZstdCompressor,
}

impl Default for DatasetCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl DatasetCodec {
    /// Create a new codec with the given config.
    #[must_use]
    pub fn new(config: CodecConfig) -> Self {
        let compressor = ZstdCompressor::with_level(config.zstd_level);
        Self { config, compressor }
    }

    /// Serialize and compress a dataset.
    pub fn compress(&self, dataset: &Dataset) -> Result<Vec<u8>> {
        let canonical = container::to_bytes(dataset)?;
        self.compress_bytes(&canonical)
    }

    /// Compress already-serialized canonical bytes.
    pub fn compress_bytes(&self, canonical: &[u8]) -> Result<Vec<u8>> {
        self.compressor.compress(canonical)
    }

    /// Decompress an artifact back to canonical container bytes.
    ///
    /// Empty, truncated, or foreign input is reported as
    /// [`BitpressError::Corruption`](bitpress_core::BitpressError::Corruption).
    pub fn decompress(&self, artifact: &[u8]) -> Result<Vec<u8>> {
        self.compressor.decompress(artifact)
    }

    /// Decompress an artifact and parse the dataset it contains.
    pub fn decompress_dataset(&self, artifact: &[u8]) -> Result<Dataset> {
        let canonical = self.decompress(artifact)?;
        container::from_bytes(&canonical)
    }

    /// Returns original_size / compressed_size.
    #[must_use]
    pub fn compression_ratio(original_size: usize, compressed_size: usize) -> f64 {
        if compressed_size == 0 {
            return 0.0;
        }
        original_size as f64 / compressed_size as f64
    }

    /// Get the current configuration.
    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}
