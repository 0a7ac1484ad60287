//! # bitpress-core
//!
//! Core infrastructure for the bitpress tools.
//!
//! Provides shared abstractions for:
//! - Compression (zstd)
//! - Element types and their IEEE-754 bit layout (DType)
//! - Local file storage with atomic replacement
//! - The error taxonomy shared by every stage

pub mod compression;
pub mod error;
pub mod storage;
pub mod types;

pub use compression::{Compressor, ZstdCompressor};
pub use error::{BitpressError, Result};
pub use types::DType;
