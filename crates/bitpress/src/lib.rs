//! # bitpress
//!
//! Information-preserving precision reduction and compression for gridded
//! scientific datasets.
//!
//! For each floating-point variable the number of mantissa bits that carry
//! real information is estimated from bit-pair statistics of neighbouring
//! values. Everything below that is rounded away, and the rounded dataset is
//! compressed losslessly with zstd:
//!
//! 1. **Bit information** - mutual information per bit position along an axis
//! 2. **Keepbits** - bits needed to retain a fraction of total information
//! 3. **Bit rounding** - round-to-nearest at that precision
//! 4. **Zstd compression** - over the canonical container bytes
//!
//! ## Quick Start
//!
//! ```rust
//! use bitpress::codec::DatasetCodec;
//! use bitpress::dataset::{Dataset, Variable, VariableData};
//! use bitpress::pipeline::{PrecisionReducer, ReductionConfig};
//! use bitpress::policy::ClassificationPolicy;
//! use ndarray::Array2;
//!
//! let field = Array2::from_shape_fn((16, 64), |(i, j)| 280.0f32 + i as f32 + (j as f32 * 0.1).sin());
//! let mut ds = Dataset::new();
//! ds.add_variable("temp", Variable::new(["lat", "lon"], VariableData::Float32(field.into_dyn())).unwrap())
//!     .unwrap();
//!
//! let reducer = PrecisionReducer::new(ReductionConfig::with_retention(0.99), ClassificationPolicy::default())
//!     .unwrap();
//! let report = reducer.reduce(&mut ds);
//! assert_eq!(report.variables.len(), 1);
//!
//! let codec = DatasetCodec::default();
//! let compressed = codec.compress(&ds).unwrap();
//! let restored = codec.decompress_dataset(&compressed).unwrap();
//! assert!(restored.variable("temp").unwrap().data().bit_eq(ds.variable("temp").unwrap().data()));
//! ```
//!
//! ## Modules
//!
//! - [`dataset`] - Dimensioned, attributed variables
//! - [`container`] - Canonical `.bpds` byte layout
//! - [`bitinfo`] - Bitwise information content
//! - [`keepbits`] - Information curve to keepbits
//! - [`bitround`] - Mantissa rounding
//! - [`policy`] - Coordinate and always-exempt classification
//! - [`pipeline`] - Per-variable precision reduction
//! - [`codec`] - Zstd over canonical bytes
//! - [`verify`] - Original vs restored comparison
//! - [`workflow`] - File-level compress, decompress, verify, analyze

pub mod bitinfo;
pub mod bitround;
pub mod bits;
pub mod codec;
pub mod container;
pub mod dataset;
pub mod keepbits;
pub mod pipeline;
pub mod policy;
pub mod verify;
pub mod workflow;

// Re-export main types
pub use bitinfo::{AxisReduction, BitInfoEstimator, BitInfoError, InformationCurve};
pub use bitround::{bitround_f32, bitround_f64, bitround_variable, BitRoundError};
pub use codec::{CodecConfig, CompressionStats, DatasetCodec};
pub use dataset::{AttrValue, Attributes, Dataset, Variable, VariableData};
pub use keepbits::{resolve_keepbits, KeepBitsError};
pub use pipeline::{
    ExemptReason, KeepBitsSource, PrecisionReducer, ReductionConfig, ReductionReport,
    VariableAnalysis, VariableOutcome,
};
pub use policy::{ClassificationPolicy, CoordinatePolicy, DimensionCoordinates, VariableClass};
pub use verify::{verify_datasets, VerificationReport};
