//! Precision reduction pipeline.
//!
//! Classifies every variable of a [`Dataset`], estimates bit information for
//! the data variables, resolves keepbits and rounds in place. Variables that
//! cannot or should not be rounded are left bit-identical and reported, so the
//! set of variable names never changes.

use std::collections::BTreeMap;
use std::fmt;

use bitpress_core::{BitpressError, DType, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bitinfo::{AxisReduction, BitInfoEstimator, InformationCurve};
use crate::bitround::{bitround_variable, lossless_keepbits};
use crate::dataset::{Dataset, Variable};
use crate::keepbits::{resolve_keepbits, validate_retention_level};
use crate::policy::{ClassificationPolicy, VariableClass};

/// Configuration for precision reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionConfig {
    /// Fraction of total information to keep, in (0, 1]
    pub retention_level: f64,
    /// Dimension along which neighbouring values are paired
    pub axis: String,
    /// How per-position information is collapsed along the axis
    pub axis_reduction: AxisReduction,
    /// Confidence of the significance filter, in (0, 1)
    pub confidence: f64,
    /// Keepbits forced for specific variables, bypassing estimation
    pub fixed_keepbits: BTreeMap<String, u32>,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            retention_level: 0.99,
            axis: "lon".to_string(),
            axis_reduction: AxisReduction::Pooled,
            confidence: BitInfoEstimator::DEFAULT_CONFIDENCE,
            fixed_keepbits: BTreeMap::new(),
        }
    }
}

impl ReductionConfig {
    /// Default config at the given retention level.
    #[must_use]
    pub fn with_retention(retention_level: f64) -> Self {
        Self {
            retention_level,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn axis(mut self, axis: impl Into<String>) -> Self {
        self.axis = axis.into();
        self
    }

    #[must_use]
    pub fn axis_reduction(mut self, reduction: AxisReduction) -> Self {
        self.axis_reduction = reduction;
        self
    }

    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Force `keepbits` for the variable `name`.
    #[must_use]
    pub fn fixed(mut self, name: impl Into<String>, keepbits: u32) -> Self {
        self.fixed_keepbits.insert(name.into(), keepbits);
        self
    }

    /// Check every field; errors are [`BitpressError::Config`].
    pub fn validate(&self) -> Result<()> {
        validate_retention_level(self.retention_level)
            .map_err(|e| BitpressError::Config(e.to_string()))?;
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(BitpressError::Config(format!(
                "Confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.axis.is_empty() {
            return Err(BitpressError::Config(
                "Reduction axis name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where an applied keepbits value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepBitsSource {
    /// Resolved from the information curve.
    Estimated,
    /// The curve carried no information; the smallest exact precision was used.
    Lossless,
    /// Set explicitly in the config.
    Fixed,
}

/// Why a variable was left untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExemptReason {
    Coordinate,
    Preserved,
    /// Integer data carried through unchanged.
    NonFloat { dtype: DType },
    /// Resolved keepbits fell below zero.
    NegativeKeepBits { keepbits: i32 },
    /// The variable could not be analysed or rounded.
    Invalid { message: String },
}

impl ExemptReason {
    /// Exemptions that are reported as excluded variables.
    ///
    /// Coordinates, preserved variables and integer data are exempt by
    /// policy and are not counted as exclusions.
    #[must_use]
    pub fn is_exclusion(&self) -> bool {
        matches!(self, Self::NegativeKeepBits { .. } | Self::Invalid { .. })
    }
}

impl fmt::Display for ExemptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinate => write!(f, "coordinate"),
            Self::Preserved => write!(f, "preserved"),
            Self::NonFloat { dtype } => write!(f, "non-float ({})", dtype),
            Self::NegativeKeepBits { keepbits } => write!(f, "negative keepbits ({})", keepbits),
            Self::Invalid { message } => write!(f, "{}", message),
        }
    }
}

/// Decision taken for one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariableOutcome {
    Rounded { keepbits: u32, source: KeepBitsSource },
    Exempt(ExemptReason),
}

impl VariableOutcome {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Exempt(ExemptReason::Invalid {
            message: message.into(),
        })
    }
}

/// Analysis of one variable: its class, curve (if estimated) and outcome.
#[derive(Debug, Clone, Serialize)]
pub struct VariableAnalysis {
    pub class: VariableClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<InformationCurve>,
    /// Keepbits resolved from the curve before any exemption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_keepbits: Option<i32>,
    pub outcome: VariableOutcome,
}

/// Outcome of a reduction run, keyed by variable name.
#[derive(Debug, Clone, Serialize)]
pub struct ReductionReport {
    pub retention_level: f64,
    pub axis: String,
    pub variables: BTreeMap<String, VariableOutcome>,
}

impl ReductionReport {
    /// Rounded variables and the keepbits applied to each.
    pub fn rounded(&self) -> impl Iterator<Item = (&str, u32)> {
        self.variables.iter().filter_map(|(name, outcome)| match outcome {
            VariableOutcome::Rounded { keepbits, .. } => Some((name.as_str(), *keepbits)),
            VariableOutcome::Exempt(_) => None,
        })
    }

    /// Data variables excluded from rounding, with the reason.
    pub fn excluded(&self) -> impl Iterator<Item = (&str, &ExemptReason)> {
        self.variables.iter().filter_map(|(name, outcome)| match outcome {
            VariableOutcome::Exempt(reason) if reason.is_exclusion() => {
                Some((name.as_str(), reason))
            }
            _ => None,
        })
    }

    /// Names of excluded data variables, sorted.
    #[must_use]
    pub fn excluded_names(&self) -> Vec<&str> {
        self.excluded().map(|(name, _)| name).collect()
    }

    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&VariableOutcome> {
        self.variables.get(name)
    }
}

/// Per-variable bit-information precision reducer.
///
/// # Example
/// ```
/// use bitpress::dataset::{Dataset, Variable, VariableData};
/// use bitpress::pipeline::{PrecisionReducer, ReductionConfig, VariableOutcome};
/// use bitpress::policy::ClassificationPolicy;
/// use ndarray::{ArrayD, IxDyn};
///
/// let mut ds = Dataset::new();
/// let temp = VariableData::Float32(ArrayD::from_elem(IxDyn(&[10, 10]), 5.0f32));
/// ds.add_variable("temp", Variable::new(["lat", "lon"], temp).unwrap()).unwrap();
///
/// let reducer = PrecisionReducer::new(
///     ReductionConfig::with_retention(0.99),
///     ClassificationPolicy::default(),
/// )
/// .unwrap();
/// let report = reducer.reduce(&mut ds);
/// assert!(matches!(report.outcome("temp"), Some(VariableOutcome::Rounded { .. })));
/// ```
#[derive(Debug)]
pub struct PrecisionReducer {
    config: ReductionConfig,
    policy: ClassificationPolicy,
    estimator: BitInfoEstimator,
}

impl PrecisionReducer {
    /// Create a reducer, validating `config`.
    pub fn new(config: ReductionConfig, policy: ClassificationPolicy) -> Result<Self> {
        config.validate()?;
        let estimator = BitInfoEstimator::new(config.axis.clone())
            .with_reduction(config.axis_reduction)
            .with_confidence(config.confidence);
        Ok(Self {
            config,
            policy,
            estimator,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ReductionConfig {
        &self.config
    }

    #[must_use]
    pub fn policy(&self) -> &ClassificationPolicy {
        &self.policy
    }

    /// Classify and analyse every variable without modifying the dataset.
    ///
    /// Variables are analysed in parallel; the result is ordered by name.
    #[must_use]
    pub fn analyze(&self, dataset: &Dataset) -> BTreeMap<String, VariableAnalysis> {
        let dimensions = dataset.dimensions();
        dataset
            .variables()
            .par_iter()
            .map(|(name, var)| {
                let analysis = match self.policy.classify(name, var, dimensions) {
                    VariableClass::Coordinate => exempt(VariableClass::Coordinate, ExemptReason::Coordinate),
                    VariableClass::Preserved => exempt(VariableClass::Preserved, ExemptReason::Preserved),
                    VariableClass::Data => self.analyze_data(name, var),
                };
                (name.clone(), analysis)
            })
            .collect()
    }

    fn analyze_data(&self, name: &str, var: &Variable) -> VariableAnalysis {
        let mut analysis = VariableAnalysis {
            class: VariableClass::Data,
            curve: None,
            resolved_keepbits: None,
            outcome: VariableOutcome::invalid("not analysed"),
        };

        let dtype = var.dtype();
        if !dtype.is_float() {
            analysis.outcome = VariableOutcome::Exempt(ExemptReason::NonFloat { dtype });
            return analysis;
        }

        if let Some(&keepbits) = self.config.fixed_keepbits.get(name) {
            analysis.outcome = if keepbits as usize > dtype.mantissa_bits() {
                VariableOutcome::invalid(format!(
                    "keepbits {} exceeds {} mantissa bits of {}",
                    keepbits,
                    dtype.mantissa_bits(),
                    dtype
                ))
            } else {
                VariableOutcome::Rounded {
                    keepbits,
                    source: KeepBitsSource::Fixed,
                }
            };
            return analysis;
        }

        let curve = match self.estimator.estimate(var) {
            Ok(curve) => curve,
            Err(e) => {
                analysis.outcome = VariableOutcome::invalid(e.to_string());
                return analysis;
            }
        };

        let resolved = match resolve_keepbits(&curve, self.config.retention_level) {
            Ok(k) => k,
            Err(e) => {
                analysis.outcome = VariableOutcome::invalid(e.to_string());
                return analysis;
            }
        };

        analysis.outcome = if curve.is_degenerate() {
            let keepbits = lossless_keepbits(var).unwrap_or(curve.dtype().mantissa_bits() as u32);
            VariableOutcome::Rounded {
                keepbits,
                source: KeepBitsSource::Lossless,
            }
        } else if resolved < 0 {
            VariableOutcome::Exempt(ExemptReason::NegativeKeepBits { keepbits: resolved })
        } else {
            VariableOutcome::Rounded {
                keepbits: resolved as u32,
                source: KeepBitsSource::Estimated,
            }
        };
        analysis.resolved_keepbits = Some(resolved);
        analysis.curve = Some(curve);
        analysis
    }

    /// Round every data variable of `dataset` in place.
    ///
    /// Per-variable failures exempt that variable and never abort the run.
    pub fn reduce(&self, dataset: &mut Dataset) -> ReductionReport {
        let mut outcomes: BTreeMap<String, VariableOutcome> = self
            .analyze(dataset)
            .into_iter()
            .map(|(name, analysis)| (name, analysis.outcome))
            .collect();

        let failures: Vec<(String, String)> = dataset
            .variables_mut()
            .par_iter_mut()
            .filter_map(|(name, var)| match outcomes.get(name) {
                Some(VariableOutcome::Rounded { keepbits, .. }) => {
                    bitround_variable(var, *keepbits as i32)
                        .err()
                        .map(|e| (name.clone(), e.to_string()))
                }
                _ => None,
            })
            .collect();
        for (name, message) in failures {
            outcomes.insert(name, VariableOutcome::invalid(message));
        }

        for (name, outcome) in &outcomes {
            match outcome {
                VariableOutcome::Rounded { keepbits, source } => {
                    debug!(variable = %name, keepbits, ?source, "Rounded variable");
                }
                VariableOutcome::Exempt(reason) if reason.is_exclusion() => {
                    warn!(variable = %name, %reason, "Variable excluded from rounding");
                }
                VariableOutcome::Exempt(reason) => {
                    debug!(variable = %name, %reason, "Variable kept exact");
                }
            }
        }

        let report = ReductionReport {
            retention_level: self.config.retention_level,
            axis: self.config.axis.clone(),
            variables: outcomes,
        };
        info!(
            rounded = report.rounded().count(),
            excluded = report.excluded().count(),
            total = report.variables.len(),
            "Precision reduction complete"
        );
        report
    }
}

fn exempt(class: VariableClass, reason: ExemptReason) -> VariableAnalysis {
    VariableAnalysis {
        class,
        curve: None,
        resolved_keepbits: None,
        outcome: VariableOutcome::Exempt(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::VariableData;
    use ndarray::{Array1, Array2, Array3, ArrayD, IxDyn};

    fn f32_var(dims: &[&str], data: ArrayD<f32>) -> Variable {
        Variable::new(dims.iter().copied(), VariableData::Float32(data)).unwrap()
    }

    fn climate() -> Dataset {
        let mut ds = Dataset::new();
        let lat = Array1::linspace(-60.0f64, 60.0, 16).into_dyn();
        let lon = Array1::linspace(0.0f64, 357.1875, 128).into_dyn();
        let temp = Array2::from_shape_fn((16, 128), |(i, j)| {
            let lat = -60.0 + 8.0 * i as f32;
            let lon = 2.8125 * j as f32;
            273.15 + 25.0 * (lat.to_radians()).cos() + 3.0 * (lon.to_radians() * 2.0).sin()
        });
        ds.add_variable("lat", Variable::new(["lat"], VariableData::Float64(lat)).unwrap())
            .unwrap();
        ds.add_variable("lon", Variable::new(["lon"], VariableData::Float64(lon)).unwrap())
            .unwrap();
        ds.add_variable("temp", f32_var(&["lat", "lon"], temp.into_dyn()))
            .unwrap();
        ds
    }

    fn reducer(config: ReductionConfig) -> PrecisionReducer {
        PrecisionReducer::new(config, ClassificationPolicy::default()).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = ReductionConfig::default();
        assert_eq!(config.retention_level, 0.99);
        assert_eq!(config.axis, "lon");
        assert_eq!(config.axis_reduction, AxisReduction::Pooled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        for level in [0.0, -0.5, 1.5, f64::NAN] {
            let err = ReductionConfig::with_retention(level).validate().unwrap_err();
            assert!(matches!(err, BitpressError::Config(_)), "{level}");
        }
        assert!(ReductionConfig::default().confidence(1.0).validate().is_err());
        assert!(ReductionConfig::default().axis("").validate().is_err());
        assert!(PrecisionReducer::new(
            ReductionConfig::with_retention(2.0),
            ClassificationPolicy::default()
        )
        .is_err());
    }

    #[test]
    fn test_constant_field_stays_exact() {
        let mut ds = Dataset::new();
        ds.add_variable(
            "temp",
            f32_var(&["lat", "lon"], ArrayD::from_elem(IxDyn(&[10, 10]), 5.0)),
        )
        .unwrap();

        let analysis = reducer(ReductionConfig::default()).analyze(&ds);
        let temp = &analysis["temp"];
        assert!(temp.curve.as_ref().unwrap().is_degenerate());
        assert_eq!(temp.resolved_keepbits, Some(0));

        let report = reducer(ReductionConfig::default()).reduce(&mut ds);
        assert!(matches!(
            report.outcome("temp"),
            Some(VariableOutcome::Rounded {
                source: KeepBitsSource::Lossless,
                ..
            })
        ));
        let VariableData::Float32(a) = ds.variable("temp").unwrap().data() else {
            panic!("dtype changed");
        };
        assert!(a.iter().all(|&v| v == 5.0));
    }

    #[test]
    fn test_coordinates_untouched_and_data_rounded() {
        let mut ds = climate();
        let before = ds.clone();
        let report = reducer(ReductionConfig::with_retention(0.9)).reduce(&mut ds);

        for coord in ["lat", "lon"] {
            assert_eq!(
                report.outcome(coord),
                Some(&VariableOutcome::Exempt(ExemptReason::Coordinate))
            );
            assert!(ds.variable(coord).unwrap().data().bit_eq(before.variable(coord).unwrap().data()));
        }
        let (name, keepbits) = report.rounded().next().unwrap();
        assert_eq!(name, "temp");
        assert!(keepbits < 23);
        assert!(report.excluded_names().is_empty());
    }

    #[test]
    fn test_name_set_preserved() {
        let mut ds = climate();
        ds.add_variable(
            "count",
            Variable::new(
                ["lon"],
                VariableData::Int32(ArrayD::from_elem(IxDyn(&[128]), 7)),
            )
            .unwrap(),
        )
        .unwrap();
        let names: Vec<String> = ds.variable_names().map(String::from).collect();

        let report = reducer(ReductionConfig::default()).reduce(&mut ds);
        let after: Vec<String> = ds.variable_names().map(String::from).collect();
        assert_eq!(names, after);
        assert_eq!(report.variables.keys().cloned().collect::<Vec<_>>(), names);
        assert_eq!(
            report.outcome("count"),
            Some(&VariableOutcome::Exempt(ExemptReason::NonFloat { dtype: DType::Int32 }))
        );
        assert!(report.excluded_names().is_empty());
    }

    #[test]
    fn test_missing_axis_is_exclusion_not_failure() {
        let mut ds = climate();
        ds.add_variable(
            "profile",
            f32_var(&["lat"], Array1::linspace(0.0, 1.0, 16).into_dyn()),
        )
        .unwrap();
        let before = ds.variable("profile").unwrap().clone();

        let report = reducer(ReductionConfig::default()).reduce(&mut ds);
        assert!(matches!(
            report.outcome("profile"),
            Some(VariableOutcome::Exempt(ExemptReason::Invalid { .. }))
        ));
        assert!(ds.variable("profile").unwrap().data().bit_eq(before.data()));
        assert!(matches!(report.outcome("temp"), Some(VariableOutcome::Rounded { .. })));
    }

    #[test]
    fn test_negative_keepbits_left_bit_identical() {
        // Neighbours alternate between two magnitudes; the leading informative
        // bits sit in the exponent.
        let data = Array3::from_shape_fn((4, 8, 256), |(_, _, k)| {
            if (k * 7919) % 3 == 0 {
                1.0e-3f32
            } else {
                1.0e3f32
            }
        });
        let mut ds = Dataset::new();
        ds.add_variable("flip", f32_var(&["time", "lat", "lon"], data.into_dyn()))
            .unwrap();
        let before = ds.clone();

        let reducer = reducer(ReductionConfig::with_retention(0.27));
        let analysis = reducer.analyze(&ds);
        let resolved = analysis["flip"].resolved_keepbits.unwrap();
        assert!(resolved < 0, "resolved {resolved}");

        let report = reducer.reduce(&mut ds);
        assert_eq!(report.excluded_names(), vec!["flip"]);
        assert!(ds
            .variable("flip")
            .unwrap()
            .data()
            .bit_eq(before.variable("flip").unwrap().data()));
    }

    #[test]
    fn test_preserved_and_named_coordinates() {
        let mut ds = climate();
        ds.add_variable(
            "TAITIME",
            Variable::new(
                ["lon"],
                VariableData::Float64(Array1::linspace(1.0e9, 1.0e9 + 127.0, 128).into_dyn()),
            )
            .unwrap(),
        )
        .unwrap();
        let policy = ClassificationPolicy::default().with_preserved(["TAITIME"]);
        let report = PrecisionReducer::new(ReductionConfig::default(), policy)
            .unwrap()
            .reduce(&mut ds);
        assert_eq!(
            report.outcome("TAITIME"),
            Some(&VariableOutcome::Exempt(ExemptReason::Preserved))
        );
        assert!(report.excluded_names().is_empty());
    }

    #[test]
    fn test_fixed_keepbits() {
        let mut ds = climate();
        let config = ReductionConfig::default().fixed("temp", 10).fixed("lat", 3);
        let report = reducer(config).reduce(&mut ds);
        assert_eq!(
            report.outcome("temp"),
            Some(&VariableOutcome::Rounded {
                keepbits: 10,
                source: KeepBitsSource::Fixed
            })
        );
        // Coordinates win over fixed keepbits.
        assert_eq!(
            report.outcome("lat"),
            Some(&VariableOutcome::Exempt(ExemptReason::Coordinate))
        );
    }

    #[test]
    fn test_fixed_keepbits_out_of_range() {
        let mut ds = climate();
        let report = reducer(ReductionConfig::default().fixed("temp", 40)).reduce(&mut ds);
        assert_eq!(report.excluded_names(), vec!["temp"]);
    }

    #[test]
    fn test_reduction_is_deterministic() {
        let config = ReductionConfig::with_retention(0.95);
        let mut a = climate();
        let mut b = climate();
        let ra = reducer(config.clone()).reduce(&mut a);
        let rb = reducer(config).reduce(&mut b);
        assert_eq!(ra.variables, rb.variables);
        assert!(a.variable("temp").unwrap().data().bit_eq(b.variable("temp").unwrap().data()));
    }

    #[test]
    fn test_report_serializes() {
        let mut ds = climate();
        let report = reducer(ReductionConfig::default()).reduce(&mut ds);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["variables"]["lat"]["status"], "exempt");
        assert_eq!(json["variables"]["lat"]["reason"], "coordinate");
        assert_eq!(json["variables"]["temp"]["status"], "rounded");
    }
}
