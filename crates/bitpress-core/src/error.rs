//! Error types for bitpress.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bitpress operations.
pub type Result<T> = std::result::Result<T, BitpressError>;

/// Errors that can occur in bitpress operations.
#[derive(Error, Debug)]
pub enum BitpressError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a specific file
    #[error("I/O error on {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Compressed input is malformed or truncated
    #[error("Corrupt compressed data: {0}")]
    Corruption(String),

    /// Invalid container format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Dataset or variable failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BitpressError {
    /// Wrap an I/O error with the path it happened on.
    pub fn path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Path {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the compressed input could not be decoded.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}
