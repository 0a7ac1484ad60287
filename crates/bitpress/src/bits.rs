//! Raw IEEE-754 bit access shared by the estimator and the rounder.

use bitpress_core::DType;

/// A float type whose bit pattern can be read and rebuilt through a `u64`.
pub trait FloatBits: Copy + Send + Sync + 'static {
    const DTYPE: DType;
    /// Total bit width.
    const BITS: u32;
    /// Explicitly stored mantissa bits.
    const MANTISSA_BITS: u32;

    /// Bit pattern, zero-extended to 64 bits.
    fn to_raw(self) -> u64;

    /// Rebuild from a bit pattern produced by [`FloatBits::to_raw`].
    fn from_raw(raw: u64) -> Self;

    fn is_finite(self) -> bool;
}

impl FloatBits for f32 {
    const DTYPE: DType = DType::Float32;
    const BITS: u32 = 32;
    const MANTISSA_BITS: u32 = f32::MANTISSA_DIGITS - 1;

    #[inline]
    fn to_raw(self) -> u64 {
        u64::from(self.to_bits())
    }

    #[inline]
    fn from_raw(raw: u64) -> Self {
        f32::from_bits(raw as u32)
    }

    #[inline]
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
}

impl FloatBits for f64 {
    const DTYPE: DType = DType::Float64;
    const BITS: u32 = 64;
    const MANTISSA_BITS: u32 = f64::MANTISSA_DIGITS - 1;

    #[inline]
    fn to_raw(self) -> u64 {
        self.to_bits()
    }

    #[inline]
    fn from_raw(raw: u64) -> Self {
        f64::from_bits(raw)
    }

    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_dtype() {
        assert_eq!(f32::MANTISSA_BITS as usize, DType::Float32.mantissa_bits());
        assert_eq!(f64::MANTISSA_BITS as usize, DType::Float64.mantissa_bits());
        assert_eq!(f32::BITS as usize, f32::DTYPE.total_bits());
    }

    #[test]
    fn test_raw_roundtrip() {
        for v in [0.0f32, -0.0, 1.5, f32::MIN_POSITIVE, f32::MAX] {
            assert_eq!(f32::from_raw(v.to_raw()).to_bits(), v.to_bits());
        }
        assert_eq!(f64::from_raw((-2.25f64).to_raw()), -2.25);
    }
}
