//! Element types for dataset variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BitpressError;

/// Element types a variable can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit IEEE-754 floating point
    Float32,
    /// 64-bit IEEE-754 floating point
    Float64,
    /// 8-bit signed integer
    Int8,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer (also used for encoded time axes)
    Int64,
}

impl DType {
    /// All supported element types.
    pub const ALL: [DType; 7] = [
        DType::Float32,
        DType::Float64,
        DType::Int8,
        DType::UInt8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
    ];

    /// Size in bytes of a single element.
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 | Self::Int64 => 8,
            Self::Int16 => 2,
            Self::Int8 | Self::UInt8 => 1,
        }
    }

    /// Whether values of this type carry a mantissa that can be rounded.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Total bit width of one element.
    #[must_use]
    pub const fn total_bits(&self) -> usize {
        self.size_bytes() * 8
    }

    /// Number of sign bits (1 for floats, 0 otherwise).
    #[must_use]
    pub const fn sign_bits(&self) -> usize {
        if self.is_float() {
            1
        } else {
            0
        }
    }

    /// Number of exponent bits (0 for integer types).
    #[must_use]
    pub const fn exponent_bits(&self) -> usize {
        match self {
            Self::Float32 => 8,
            Self::Float64 => 11,
            _ => 0,
        }
    }

    /// Number of explicitly stored mantissa bits (0 for integer types).
    #[must_use]
    pub const fn mantissa_bits(&self) -> usize {
        match self {
            Self::Float32 => 23,
            Self::Float64 => 52,
            _ => 0,
        }
    }

    /// Short tag used in container headers.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "F32",
            Self::Float64 => "F64",
            Self::Int8 => "I8",
            Self::UInt8 => "U8",
            Self::Int16 => "I16",
            Self::Int32 => "I32",
            Self::Int64 => "I64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = BitpressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F32" | "float32" => Ok(Self::Float32),
            "F64" | "float64" => Ok(Self::Float64),
            "I8" | "int8" => Ok(Self::Int8),
            "U8" | "uint8" => Ok(Self::UInt8),
            "I16" | "int16" => Ok(Self::Int16),
            "I32" | "int32" => Ok(Self::Int32),
            "I64" | "int64" => Ok(Self::Int64),
            _ => Err(BitpressError::InvalidFormat(format!(
                "Unknown dtype: {}",
                s
            ))),
        }
    }
}
