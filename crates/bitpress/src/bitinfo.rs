//! Bitwise real information content.
//!
//! For every bit position of the IEEE-754 representation (sign, exponent,
//! mantissa; most significant first) the estimator measures the mutual
//! information between that bit in neighbouring elements along a reduction
//! axis. Bits that carry information about their neighbour are signal; bits
//! that look independent of it are noise and can be rounded away.
//!
//! ## Algorithm
//!
//! 1. Walk every 1-D lane of the array along the reduction axis and count,
//!    per bit position, the four bit pairs `(b(x[k]), b(x[k+1]))`.
//! 2. Turn each 2×2 count table into mutual information (in bits).
//! 3. Zero out information that a fair coin could produce with the same
//!    sample size at the configured confidence (binomial free entropy).
//!
//! Pairs containing NaN or infinity are skipped so masked values never
//! contribute information.
//!
//! [`AxisReduction`] decides whether neighbour pairs are pooled across the
//! whole axis before step 2, or whether information is computed per
//! neighbour position along the axis and then collapsed with max or mean.

use bitpress_core::DType;
use ndarray::{ArrayViewD, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bits::FloatBits;
use crate::dataset::{Variable, VariableData};

/// Error types for bit-information estimation.
///
/// Each of these means "this variable cannot be analysed"; callers exempt the
/// variable from rounding instead of aborting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BitInfoError {
    #[error("Unsupported dtype for bit information: {0}")]
    UnsupportedDType(DType),

    #[error("Reduction axis '{axis}' not among dimensions {dims:?}")]
    MissingAxis { axis: String, dims: Vec<String> },
}

/// How per-position information along the reduction axis is collapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisReduction {
    /// Pool every neighbour pair along the axis into one count table.
    #[default]
    Pooled,
    /// Per neighbour position, keep the largest information seen.
    Max,
    /// Per neighbour position, average the information.
    Mean,
}

/// Information content per bit position of one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InformationCurve {
    dtype: DType,
    /// One entry per bit, sign bit first.
    bits: Vec<f64>,
}

impl InformationCurve {
    /// Build a curve from per-bit information, sign bit first.
    ///
    /// Returns `None` if `dtype` is not a float or the length does not match
    /// its bit width.
    #[must_use]
    pub fn from_bits(dtype: DType, bits: Vec<f64>) -> Option<Self> {
        if !dtype.is_float() || bits.len() != dtype.total_bits() {
            return None;
        }
        Some(Self { dtype, bits })
    }

    fn zeros(dtype: DType) -> Self {
        Self {
            dtype,
            bits: vec![0.0; dtype.total_bits()],
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Information for every bit position, sign bit first.
    #[must_use]
    pub fn bits(&self) -> &[f64] {
        &self.bits
    }

    /// Number of sign and exponent bits preceding the mantissa.
    #[must_use]
    pub fn non_mantissa_bits(&self) -> usize {
        self.dtype.sign_bits() + self.dtype.exponent_bits()
    }

    /// Information for the mantissa bits only, most significant first.
    #[must_use]
    pub fn mantissa(&self) -> &[f64] {
        &self.bits[self.non_mantissa_bits()..]
    }

    /// `(position, information)` pairs over the mantissa, position 1 being
    /// the most significant mantissa bit.
    pub fn mantissa_positions(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.mantissa().iter().enumerate().map(|(i, &v)| (i + 1, v))
    }

    /// Sum of information over all bit positions.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.bits.iter().sum()
    }

    /// True when no bit carries significant information (e.g. constant data).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.total() <= 0.0
    }
}

/// Bit-pair counts for one set of neighbour pairs.
#[derive(Debug, Clone)]
struct BitPairCounts {
    counts: Vec<[[u64; 2]; 2]>,
    pairs: u64,
}

impl BitPairCounts {
    fn new(nbits: usize) -> Self {
        Self {
            counts: vec![[[0; 2]; 2]; nbits],
            pairs: 0,
        }
    }

    #[inline]
    fn add(&mut self, a: u64, b: u64) {
        let nbits = self.counts.len();
        for (i, table) in self.counts.iter_mut().enumerate() {
            let shift = nbits - 1 - i;
            let ba = ((a >> shift) & 1) as usize;
            let bb = ((b >> shift) & 1) as usize;
            table[ba][bb] += 1;
        }
        self.pairs += 1;
    }

    /// Mutual information per bit, with insignificant values zeroed.
    fn information(&self, confidence: f64) -> Vec<f64> {
        if self.pairs == 0 {
            return vec![0.0; self.counts.len()];
        }
        let threshold = free_entropy(self.pairs, confidence);
        self.counts
            .iter()
            .map(|table| {
                let mi = mutual_information(table, self.pairs);
                if mi > threshold {
                    mi
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Mutual information (bits) of a 2×2 joint count table.
fn mutual_information(table: &[[u64; 2]; 2], n: u64) -> f64 {
    let n = n as f64;
    let p = [
        [table[0][0] as f64 / n, table[0][1] as f64 / n],
        [table[1][0] as f64 / n, table[1][1] as f64 / n],
    ];
    let pa = [p[0][0] + p[0][1], p[1][0] + p[1][1]];
    let pb = [p[0][0] + p[1][0], p[0][1] + p[1][1]];

    let mut mi = 0.0;
    for a in 0..2 {
        for b in 0..2 {
            if p[a][b] > 0.0 {
                mi += p[a][b] * (p[a][b] / (pa[a] * pb[b])).log2();
            }
        }
    }
    // Rounding can leave tiny negatives for independent bits.
    mi.max(0.0)
}

/// Information a random 50/50 bit could show with `n` samples at `confidence`.
fn free_entropy(n: u64, confidence: f64) -> f64 {
    let z = normal_quantile(1.0 - (1.0 - confidence) / 2.0);
    let p = (0.5 + z / (2.0 * (n as f64).sqrt())).min(1.0);
    1.0 - binary_entropy(p)
}

fn binary_entropy(p: f64) -> f64 {
    let h = |x: f64| if x > 0.0 { -x * x.log2() } else { 0.0 };
    h(p) + h(1.0 - p)
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// relative error below 1.2e-9).
fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p <= 0.0 {
        f64::NEG_INFINITY
    } else if p >= 1.0 {
        f64::INFINITY
    } else if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Computes [`InformationCurve`]s along a named reduction axis.
#[derive(Debug, Clone)]
pub struct BitInfoEstimator {
    axis: String,
    reduction: AxisReduction,
    confidence: f64,
}

impl BitInfoEstimator {
    /// Default confidence for the significance filter.
    pub const DEFAULT_CONFIDENCE: f64 = 0.99;

    /// Create an estimator that pairs neighbours along `axis`.
    #[must_use]
    pub fn new(axis: impl Into<String>) -> Self {
        Self {
            axis: axis.into(),
            reduction: AxisReduction::default(),
            confidence: Self::DEFAULT_CONFIDENCE,
        }
    }

    #[must_use]
    pub fn with_reduction(mut self, reduction: AxisReduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Confidence in (0, 1) used to discard information indistinguishable
    /// from a random bit.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    #[must_use]
    pub fn axis(&self) -> &str {
        &self.axis
    }

    /// Estimate the information curve of one variable.
    pub fn estimate(&self, variable: &Variable) -> Result<InformationCurve, BitInfoError> {
        let axis = variable
            .axis_of(&self.axis)
            .ok_or_else(|| BitInfoError::MissingAxis {
                axis: self.axis.clone(),
                dims: variable.dims().to_vec(),
            })?;

        match variable.data() {
            VariableData::Float32(a) => Ok(self.estimate_array(a.view(), axis)),
            VariableData::Float64(a) => Ok(self.estimate_array(a.view(), axis)),
            other => Err(BitInfoError::UnsupportedDType(other.dtype())),
        }
    }

    fn estimate_array<T: FloatBits>(&self, data: ArrayViewD<'_, T>, axis: usize) -> InformationCurve {
        let nbits = T::BITS as usize;
        let positions = data.len_of(Axis(axis)).saturating_sub(1);
        if positions == 0 || data.is_empty() {
            return InformationCurve::zeros(T::DTYPE);
        }

        let slots = match self.reduction {
            AxisReduction::Pooled => 1,
            AxisReduction::Max | AxisReduction::Mean => positions,
        };
        let mut counts = vec![BitPairCounts::new(nbits); slots];

        for lane in data.lanes(Axis(axis)) {
            for k in 0..positions {
                let (a, b) = (lane[k], lane[k + 1]);
                if !a.is_finite() || !b.is_finite() {
                    continue;
                }
                let slot = if slots == 1 { 0 } else { k };
                counts[slot].add(a.to_raw(), b.to_raw());
            }
        }

        let bits = match self.reduction {
            AxisReduction::Pooled => counts[0].information(self.confidence),
            AxisReduction::Max => {
                let mut out = vec![0.0f64; nbits];
                for slot in &counts {
                    for (acc, v) in out.iter_mut().zip(slot.information(self.confidence)) {
                        *acc = acc.max(v);
                    }
                }
                out
            }
            AxisReduction::Mean => {
                let mut out = vec![0.0f64; nbits];
                for slot in &counts {
                    for (acc, v) in out.iter_mut().zip(slot.information(self.confidence)) {
                        *acc += v;
                    }
                }
                let n = counts.len() as f64;
                out.iter_mut().for_each(|v| *v /= n);
                out
            }
        };

        InformationCurve { dtype: T::DTYPE, bits }
    }
}
