//! Turning an information curve into a number of mantissa bits to keep.

use thiserror::Error;

use crate::bitinfo::InformationCurve;

/// Error types for keepbits resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeepBitsError {
    #[error("Retention level must be in (0, 1], got {0}")]
    InvalidRetentionLevel(f64),
}

/// Check that a retention level is a finite fraction in (0, 1].
pub fn validate_retention_level(level: f64) -> Result<(), KeepBitsError> {
    if level.is_finite() && level > 0.0 && level <= 1.0 {
        Ok(())
    } else {
        Err(KeepBitsError::InvalidRetentionLevel(level))
    }
}

/// Resolve how many mantissa bits preserve `level` of the total information.
///
/// The cumulative fraction runs over every bit position, sign and exponent
/// included. The first position where it reaches `level` fixes the cut; the
/// sign and exponent bits are then subtracted, so a cut inside the exponent
/// yields a negative count. Negative results are returned as-is: callers
/// keep such variables exact.
///
/// A level of exactly 1.0 keeps every mantissa bit. A curve without any
/// information resolves to 0.
pub fn resolve_keepbits(curve: &InformationCurve, level: f64) -> Result<i32, KeepBitsError> {
    validate_retention_level(level)?;

    let mantissa_bits = curve.dtype().mantissa_bits() as i32;
    if level == 1.0 {
        return Ok(mantissa_bits);
    }
    if curve.is_degenerate() {
        return Ok(0);
    }

    let total = curve.total();
    let non_mantissa = curve.non_mantissa_bits() as i32;
    let mut cumulative = 0.0;
    for (i, info) in curve.bits().iter().enumerate() {
        cumulative += info;
        if cumulative / total >= level {
            return Ok(i as i32 + 1 - non_mantissa);
        }
    }
    Ok(mantissa_bits)
}
