//! File-level operations behind the CLI.
//!
//! Each operation reads its inputs fully, works in memory, and writes its
//! output atomically, so a failure at any stage leaves no partial file.

use std::collections::BTreeMap;
use std::path::Path;

use bitpress_core::storage;
use bitpress_core::Result;
use serde::Serialize;
use tracing::info;

use crate::codec::{CompressionStats, DatasetCodec};
use crate::container;
use crate::pipeline::{PrecisionReducer, ReductionReport, VariableAnalysis};
use crate::verify::{verify_datasets, VerificationReport};

/// Result of [`compress_file`].
#[derive(Debug, Clone, Serialize)]
pub struct CompressSummary {
    pub reduction: ReductionReport,
    pub stats: CompressionStats,
}

/// Reduce precision of the container at `input` and write the compressed artifact.
pub fn compress_file(
    input: &Path,
    output: &Path,
    reducer: &PrecisionReducer,
    codec: &DatasetCodec,
) -> Result<CompressSummary> {
    let mut dataset = container::read_file(input)?;
    info!(
        path = %input.display(),
        variables = dataset.variables().len(),
        "Loaded dataset"
    );

    let reduction = reducer.reduce(&mut dataset);
    let canonical = container::to_bytes(&dataset)?;
    let compressed = codec.compress_bytes(&canonical)?;
    storage::write_atomic(output, &compressed)?;

    let stats = CompressionStats::new(canonical.len(), compressed.len());
    info!(
        path = %output.display(),
        original = stats.original_size,
        compressed = stats.compressed_size,
        ratio = stats.ratio,
        "Wrote compressed artifact"
    );
    Ok(CompressSummary { reduction, stats })
}

/// Decompress an artifact and write the restored container bytes.
///
/// The restored bytes must parse as a container before anything is written.
/// A valid zstd frame whose payload is not a container fails with
/// `InvalidFormat` and leaves `output` untouched, so this is not a general
/// purpose zstd decompressor.
pub fn decompress_file(input: &Path, output: &Path, codec: &DatasetCodec) -> Result<CompressionStats> {
    let compressed = storage::read_file(input)?;
    let canonical = codec.decompress(&compressed)?;
    container::from_bytes(&canonical)?;
    storage::write_atomic(output, &canonical)?;

    let stats = CompressionStats::new(canonical.len(), compressed.len());
    info!(
        path = %output.display(),
        restored = stats.original_size,
        "Wrote restored container"
    );
    Ok(stats)
}

/// Compare two container files.
pub fn verify_files(original: &Path, restored: &Path) -> Result<VerificationReport> {
    let original = container::read_file(original)?;
    let restored = container::read_file(restored)?;
    Ok(verify_datasets(&original, &restored))
}

/// Analyse the container at `input` without writing anything.
pub fn analyze_file(
    input: &Path,
    reducer: &PrecisionReducer,
) -> Result<BTreeMap<String, VariableAnalysis>> {
    let dataset = container::read_file(input)?;
    Ok(reducer.analyze(&dataset))
}
