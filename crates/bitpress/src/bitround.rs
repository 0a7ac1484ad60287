//! Mantissa rounding.
//!
//! Rounds each finite value to the nearest float with only `keepbits`
//! explicit mantissa bits (ties to even). The sign never changes. A carry out
//! of the mantissa bumps the exponent, as IEEE rounding does (1.96 at one
//! mantissa bit becomes 2.0). NaN and infinities pass through untouched, and
//! a finite value that would round up to infinity is truncated instead.
//!
//! Rounding is idempotent and nested: rounding to `k` bits and then to any
//! `k' >= k` bits changes nothing.

use bitpress_core::DType;
use ndarray::ArrayD;
use thiserror::Error;

use crate::bits::FloatBits;
use crate::dataset::{Variable, VariableData};

/// Error types for bit rounding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BitRoundError {
    #[error("Cannot bitround {0} data")]
    UnsupportedDType(DType),

    #[error("keepbits {keepbits} outside 0..={max} for {dtype}")]
    KeepBitsOutOfRange { keepbits: i32, max: usize, dtype: DType },
}

/// Round one value to `keepbits` mantissa bits.
#[inline]
pub fn bitround<T: FloatBits>(value: T, keepbits: u32) -> T {
    if keepbits >= T::MANTISSA_BITS || !value.is_finite() {
        return value;
    }
    let drop = T::MANTISSA_BITS - keepbits;
    let raw = value.to_raw();
    let mask = !((1u64 << drop) - 1);
    let half_minus_one = (1u64 << (drop - 1)) - 1;
    let lsb = (raw >> drop) & 1;

    let rounded = T::from_raw((raw + half_minus_one + lsb) & mask);
    if rounded.is_finite() {
        rounded
    } else {
        T::from_raw(raw & mask)
    }
}

/// Round a 32-bit float.
#[inline]
#[must_use]
pub fn bitround_f32(value: f32, keepbits: u32) -> f32 {
    bitround(value, keepbits)
}

/// Round a 64-bit float.
#[inline]
#[must_use]
pub fn bitround_f64(value: f64, keepbits: u32) -> f64 {
    bitround(value, keepbits)
}

/// Round every element of an array in place.
pub fn bitround_array<T: FloatBits>(array: &mut ArrayD<T>, keepbits: u32) {
    array.mapv_inplace(|v| bitround(v, keepbits));
}

/// Round a float variable in place.
pub fn bitround_variable(variable: &mut Variable, keepbits: i32) -> Result<(), BitRoundError> {
    let dtype = variable.dtype();
    if !dtype.is_float() {
        return Err(BitRoundError::UnsupportedDType(dtype));
    }
    let max = dtype.mantissa_bits();
    if keepbits < 0 || keepbits as usize > max {
        return Err(BitRoundError::KeepBitsOutOfRange { keepbits, max, dtype });
    }

    let keepbits = keepbits as u32;
    match variable.data_mut() {
        VariableData::Float32(a) => bitround_array(a, keepbits),
        VariableData::Float64(a) => bitround_array(a, keepbits),
        _ => return Err(BitRoundError::UnsupportedDType(dtype)),
    }
    Ok(())
}

fn significant_bits<T: FloatBits>(value: T) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let mantissa = value.to_raw() & ((1u64 << T::MANTISSA_BITS) - 1);
    if mantissa == 0 {
        0
    } else {
        T::MANTISSA_BITS - mantissa.trailing_zeros()
    }
}

/// Smallest keepbits at which rounding leaves every element unchanged.
///
/// `None` for non-float variables.
#[must_use]
pub fn lossless_keepbits(variable: &Variable) -> Option<u32> {
    match variable.data() {
        VariableData::Float32(a) => Some(a.iter().map(|&v| significant_bits(v)).max().unwrap_or(0)),
        VariableData::Float64(a) => Some(a.iter().map(|&v| significant_bits(v)).max().unwrap_or(0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_round_to_nearest() {
        // 1.75 = 1.11b; one mantissa bit: tie between 1.5 and 2.0 goes to even (2.0)
        assert_eq!(bitround_f32(1.75, 1), 2.0);
        // 1.25 = 1.01b; tie between 1.0 and 1.5 goes to even (1.0)
        assert_eq!(bitround_f32(1.25, 1), 1.0);
        // 1.3 is closer to 1.5 than 1.0 at one bit
        assert_eq!(bitround_f32(1.3, 1), 1.5);
        assert_eq!(bitround_f64(1.3, 1), 1.5);
        // Zero mantissa bits: ties go to the even exponent
        assert_eq!(bitround_f32(3.0, 0), 2.0);
        assert_eq!(bitround_f32(6.0, 0), 8.0);
    }

    #[test]
    fn test_sign_preserved() {
        assert_eq!(bitround_f32(-1.3, 1), -1.5);
        assert_eq!(bitround_f32(-0.0, 0).to_bits(), (-0.0f32).to_bits());
    }

    #[test]
    fn test_full_precision_is_identity() {
        let v = std::f32::consts::PI;
        assert_eq!(bitround_f32(v, 23).to_bits(), v.to_bits());
        assert_eq!(bitround_f32(v, 40).to_bits(), v.to_bits());
        let w = std::f64::consts::E;
        assert_eq!(bitround_f64(w, 52).to_bits(), w.to_bits());
    }

    #[test]
    fn test_non_finite_untouched() {
        for keep in [0, 5, 22] {
            assert!(bitround_f32(f32::NAN, keep).is_nan());
            assert_eq!(bitround_f32(f32::INFINITY, keep), f32::INFINITY);
            assert_eq!(bitround_f32(f32::NEG_INFINITY, keep), f32::NEG_INFINITY);
            assert!(bitround_f64(f64::NAN, keep).is_nan());
        }
        let payload = f32::from_bits(0x7FC0_1234);
        assert_eq!(bitround_f32(payload, 3).to_bits(), 0x7FC0_1234);
    }

    #[test]
    fn test_max_finite_does_not_become_infinite() {
        let r = bitround_f32(f32::MAX, 0);
        assert!(r.is_finite());
        assert!(r > 0.0);
        assert!(bitround_f64(-f64::MAX, 3).is_finite());
    }

    #[test]
    fn test_idempotent() {
        for &v in &[0.1f32, 123.456, -9.87e-3, 6.02e23] {
            for keep in [0, 3, 10, 22] {
                let once = bitround_f32(v, keep);
                assert_eq!(bitround_f32(once, keep).to_bits(), once.to_bits());
                assert_eq!(bitround_f32(once, keep + 1).to_bits(), once.to_bits());
            }
        }
    }

    #[test]
    fn test_error_bounded_by_half_quantum() {
        for i in 1..1000 {
            let v = i as f64 * 0.731;
            let keep = 10;
            let r = bitround_f64(v, keep);
            let exponent = v.abs().log2().floor();
            let half_quantum = 2f64.powf(exponent - keep as f64) / 2.0;
            assert!((r - v).abs() <= half_quantum, "{v} -> {r}");
        }
    }

    #[test]
    fn test_bitround_variable_validates() {
        let data = VariableData::Float32(ArrayD::from_elem(IxDyn(&[4]), 1.3f32));
        let mut var = Variable::new(["x"], data).unwrap();

        assert!(matches!(
            bitround_variable(&mut var, -1),
            Err(BitRoundError::KeepBitsOutOfRange { .. })
        ));
        assert!(matches!(
            bitround_variable(&mut var, 24),
            Err(BitRoundError::KeepBitsOutOfRange { .. })
        ));

        bitround_variable(&mut var, 1).unwrap();
        match var.data() {
            VariableData::Float32(a) => assert!(a.iter().all(|&v| v == 1.5)),
            _ => unreachable!(),
        }

        let ints = VariableData::Int32(ArrayD::from_elem(IxDyn(&[2]), 7));
        let mut ivar = Variable::new(["x"], ints).unwrap();
        assert_eq!(
            bitround_variable(&mut ivar, 3),
            Err(BitRoundError::UnsupportedDType(DType::Int32))
        );
    }

    #[test]
    fn test_lossless_keepbits() {
        let five = VariableData::Float32(ArrayD::from_elem(IxDyn(&[10, 10]), 5.0f32));
        let var = Variable::new(["lat", "lon"], five).unwrap();
        // 5.0 = 1.01b x 2^2
        assert_eq!(lossless_keepbits(&var), Some(2));

        let mut rounded = var.clone();
        bitround_variable(&mut rounded, 2).unwrap();
        assert!(rounded.data().bit_eq(var.data()));

        let ints = VariableData::Int8(ArrayD::from_elem(IxDyn(&[1]), 1i8));
        assert_eq!(lossless_keepbits(&Variable::new(["x"], ints).unwrap()), None);
    }
}
