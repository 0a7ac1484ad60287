//! Comparison of an original dataset against a restored one.
//!
//! Every check runs independently and nothing here fails: findings are
//! collected into a [`VerificationReport`] for a human or a script to judge.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bitpress_core::DType;
use serde::Serialize;

use crate::dataset::{Attributes, Dataset};

/// Shape, dtype and numeric comparison of one data variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableCheck {
    pub name: String,
    /// False when the variable is missing from the restored dataset
    pub present: bool,
    pub shape_match: bool,
    pub dtype_match: bool,
    pub original_dtype: DType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_dtype: Option<DType>,
    /// Max absolute difference over element pairs where neither side is NaN
    pub max_error: Option<f64>,
    /// Mean absolute difference over the same pairs
    pub mean_error: Option<f64>,
}

/// Findings of [`verify_datasets`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub variables_match: bool,
    /// Names present in exactly one of the two datasets
    pub variable_difference: BTreeSet<String>,
    pub dimensions_match: bool,
    pub original_dimensions: BTreeMap<String, usize>,
    pub restored_dimensions: BTreeMap<String, usize>,
    pub data_variables: Vec<VariableCheck>,
    pub attributes_match: bool,
    pub original_attributes: Attributes,
    pub restored_attributes: Attributes,
}

impl VerificationReport {
    /// True when every structural check passed (numeric error is not judged).
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.variables_match
            && self.dimensions_match
            && self.attributes_match
            && self
                .data_variables
                .iter()
                .all(|v| v.present && v.shape_match && v.dtype_match)
    }

    /// Largest max error across data variables, if any was measurable.
    #[must_use]
    pub fn max_error(&self) -> Option<f64> {
        self.data_variables
            .iter()
            .filter_map(|v| v.max_error)
            .reduce(f64::max)
    }

    #[must_use]
    pub fn check(&self, name: &str) -> Option<&VariableCheck> {
        self.data_variables.iter().find(|v| v.name == name)
    }
}

/// Compare `restored` against `original`.
///
/// Data variables are the variables of `original` not named after one of its
/// dimensions.
#[must_use]
pub fn verify_datasets(original: &Dataset, restored: &Dataset) -> VerificationReport {
    let orig_names: BTreeSet<String> = original.variable_names().map(String::from).collect();
    let rest_names: BTreeSet<String> = restored.variable_names().map(String::from).collect();
    let variable_difference: BTreeSet<String> = orig_names
        .symmetric_difference(&rest_names)
        .cloned()
        .collect();

    let data_variables = original
        .variables()
        .iter()
        .filter(|(name, _)| !original.dimensions().contains_key(name.as_str()))
        .map(|(name, orig)| {
            let Some(rest) = restored.variable(name) else {
                return VariableCheck {
                    name: name.clone(),
                    present: false,
                    shape_match: false,
                    dtype_match: false,
                    original_dtype: orig.dtype(),
                    restored_dtype: None,
                    max_error: None,
                    mean_error: None,
                };
            };

            let shape_match = orig.shape() == rest.shape();
            let (max_error, mean_error) = if !shape_match {
                (None, None)
            } else if let (Some(a), Some(b)) = (orig.data().to_i128_vec(), rest.data().to_i128_vec()) {
                int_abs_error(&a, &b)
            } else {
                abs_error(&orig.data().to_f64_vec(), &rest.data().to_f64_vec())
            };
            VariableCheck {
                name: name.clone(),
                present: true,
                shape_match,
                dtype_match: orig.dtype() == rest.dtype(),
                original_dtype: orig.dtype(),
                restored_dtype: Some(rest.dtype()),
                max_error,
                mean_error,
            }
        })
        .collect();

    VerificationReport {
        variables_match: variable_difference.is_empty(),
        variable_difference,
        dimensions_match: original.dimensions() == restored.dimensions(),
        original_dimensions: original.dimensions().clone(),
        restored_dimensions: restored.dimensions().clone(),
        data_variables,
        attributes_match: original.attrs() == restored.attrs(),
        original_attributes: original.attrs().clone(),
        restored_attributes: restored.attrs().clone(),
    }
}

/// NaN-aware max and mean of `|a - b|`.
fn abs_error(a: &[f64], b: &[f64]) -> (Option<f64>, Option<f64>) {
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (x, y) in a.iter().zip(b) {
        let d = (x - y).abs();
        if d.is_nan() {
            continue;
        }
        max = max.max(d);
        sum += d;
        count += 1;
    }
    if count == 0 {
        (None, None)
    } else {
        (Some(max), Some(sum / count as f64))
    }
}

/// Max and mean of `|a - b|` taken in integer arithmetic, so large `i64`
/// values that share an `f64` never compare equal.
fn int_abs_error(a: &[i128], b: &[i128]) -> (Option<f64>, Option<f64>) {
    let mut max = 0u128;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (x, y) in a.iter().zip(b) {
        let d = x.abs_diff(*y);
        max = max.max(d);
        sum += d as f64;
        count += 1;
    }
    if count == 0 {
        (None, None)
    } else {
        (Some(max as f64), Some(sum / count as f64))
    }
}

fn fmt_attrs(attrs: &Attributes) -> String {
    let items: Vec<String> = attrs.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
    format!("{{{}}}", items.join(", "))
}

fn fmt_error(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.4e}", v))
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Variable name check...")?;
        writeln!(f, " - Variables match: {}", self.variables_match)?;
        if !self.variables_match {
            let diff: Vec<&str> = self.variable_difference.iter().map(String::as_str).collect();
            writeln!(f, " - Difference: {}", diff.join(", "))?;
        }

        writeln!(f, "\nDimension check...")?;
        writeln!(f, " - Dimensions match: {}", self.dimensions_match)?;
        if !self.dimensions_match {
            writeln!(f, " - Original dims: {:?}", self.original_dimensions)?;
            writeln!(f, " - Restored dims: {:?}", self.restored_dimensions)?;
        }

        writeln!(f, "\nData variable dtype and shape check...")?;
        for check in &self.data_variables {
            if check.present {
                writeln!(
                    f,
                    " - {}: shape match = {}, dtype match = {}",
                    check.name, check.shape_match, check.dtype_match
                )?;
            } else {
                writeln!(f, " - {}: missing in restored file", check.name)?;
            }
        }

        writeln!(f, "\nNumerical difference check (due to rounding)...")?;
        for check in self.data_variables.iter().filter(|c| c.present) {
            if check.shape_match {
                writeln!(
                    f,
                    " - {}: max error = {}, mean error = {}",
                    check.name,
                    fmt_error(check.max_error),
                    fmt_error(check.mean_error)
                )?;
            } else {
                writeln!(f, " - {}: shape mismatch, skipping numerical comparison.", check.name)?;
            }
        }

        writeln!(f, "\nGlobal attributes check...")?;
        writeln!(f, " - Attributes match: {}", self.attributes_match)?;
        if !self.attributes_match {
            writeln!(f, " - Original attrs: {}", fmt_attrs(&self.original_attributes))?;
            writeln!(f, " - Restored attrs: {}", fmt_attrs(&self.restored_attributes))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Variable, VariableData};
    use ndarray::{Array1, ArrayD, IxDyn};

    fn dataset(values: Vec<f32>) -> Dataset {
        let n = values.len();
        let mut ds = Dataset::new();
        ds.set_attr("source", "model");
        ds.add_variable(
            "x",
            Variable::new(
                ["x"],
                VariableData::Float64(Array1::linspace(0.0, 1.0, n).into_dyn()),
            )
            .unwrap(),
        )
        .unwrap();
        ds.add_variable(
            "v",
            Variable::new(
                ["x"],
                VariableData::Float32(ArrayD::from_shape_vec(IxDyn(&[n]), values).unwrap()),
            )
            .unwrap(),
        )
        .unwrap();
        ds
    }

    #[test]
    fn test_identical_datasets() {
        let ds = dataset(vec![1.0, 2.0, 3.0]);
        let report = verify_datasets(&ds, &ds.clone());
        assert!(report.is_consistent());
        assert_eq!(report.data_variables.len(), 1);
        assert_eq!(report.check("v").unwrap().max_error, Some(0.0));
        assert_eq!(report.max_error(), Some(0.0));
        assert!(report.check("x").is_none());
    }

    #[test]
    fn test_numeric_error_is_nan_aware() {
        let orig = dataset(vec![1.0, f32::NAN, 3.0, 4.0]);
        let rest = dataset(vec![1.5, 2.0, 3.0, f32::NAN]);
        let check = verify_datasets(&orig, &rest).check("v").cloned().unwrap();
        assert_eq!(check.max_error, Some(0.5));
        assert_eq!(check.mean_error, Some(0.25));
    }

    #[test]
    fn test_large_int64_differences_are_seen() {
        let ids = |last: i64| {
            let mut ds = Dataset::new();
            ds.add_variable(
                "id",
                Variable::new(
                    ["n"],
                    VariableData::Int64(
                        ArrayD::from_shape_vec(IxDyn(&[2]), vec![1 << 60, last]).unwrap(),
                    ),
                )
                .unwrap(),
            )
            .unwrap();
            ds
        };
        // 2^60 and 2^60 + 1 share one f64
        let check = verify_datasets(&ids(1 << 60), &ids((1 << 60) + 1))
            .check("id")
            .cloned()
            .unwrap();
        assert_eq!(check.max_error, Some(1.0));
        assert_eq!(check.mean_error, Some(0.5));
    }

    #[test]
    fn test_all_nan_has_no_error() {
        let orig = dataset(vec![f32::NAN; 3]);
        let report = verify_datasets(&orig, &orig.clone());
        assert_eq!(report.check("v").unwrap().max_error, None);
        assert!(report.to_string().contains("max error = n/a"));
    }

    #[test]
    fn test_mismatches_are_reported_not_raised() {
        let orig = dataset(vec![1.0, 2.0, 3.0]);
        let mut rest = dataset(vec![1.0, 2.0]);
        rest.set_attr("source", "other");
        rest.add_variable(
            "extra",
            Variable::new(["x"], VariableData::Int8(ArrayD::zeros(IxDyn(&[2])))).unwrap(),
        )
        .unwrap();

        let report = verify_datasets(&orig, &rest);
        assert!(!report.is_consistent());
        assert!(!report.variables_match);
        assert_eq!(
            report.variable_difference.iter().cloned().collect::<Vec<_>>(),
            vec!["extra".to_string()]
        );
        assert!(!report.dimensions_match);
        assert!(!report.attributes_match);

        let check = report.check("v").unwrap();
        assert!(!check.shape_match);
        assert!(check.dtype_match);
        assert_eq!(check.max_error, None);

        let text = report.to_string();
        assert!(text.contains(" - Difference: extra"));
        assert!(text.contains("shape mismatch, skipping numerical comparison."));
        assert!(text.contains(r#" - Restored attrs: {source: "other"}"#));
    }

    #[test]
    fn test_missing_variable() {
        let orig = dataset(vec![1.0, 2.0]);
        let mut rest = Dataset::new();
        rest.add_dimension("x", 2).unwrap();

        let report = verify_datasets(&orig, &rest);
        let check = report.check("v").unwrap();
        assert!(!check.present);
        assert!(report.to_string().contains(" - v: missing in restored file"));
    }

    #[test]
    fn test_dtype_change_detected() {
        let orig = dataset(vec![1.0, 2.0]);
        let mut rest = orig.clone();
        rest.variables_mut().insert(
            "v".to_string(),
            Variable::new(
                ["x"],
                VariableData::Float64(ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0, 2.25]).unwrap()),
            )
            .unwrap(),
        );
        let report = verify_datasets(&orig, &rest);
        let check = report.check("v").unwrap();
        assert!(!check.dtype_match);
        assert_eq!(check.restored_dtype, Some(DType::Float64));
        assert_eq!(check.max_error, Some(0.25));
    }

    #[test]
    fn test_report_serializes() {
        let ds = dataset(vec![1.0]);
        let json = serde_json::to_value(verify_datasets(&ds, &ds)).unwrap();
        assert_eq!(json["variables_match"], true);
        assert_eq!(json["data_variables"][0]["name"], "v");
    }
}
