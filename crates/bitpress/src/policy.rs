//! Variable classification.
//!
//! Which variables are coordinates, and which must always be kept exact, is a
//! property of the dataset's conventions rather than of the algorithm, so it is
//! supplied by the caller. [`ClassificationPolicy::default`] treats variables
//! named after a dimension as coordinates and exempts nothing else.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::dataset::Variable;

/// Capability check: is this variable a coordinate?
pub trait CoordinatePolicy: Send + Sync {
    fn is_coordinate(
        &self,
        name: &str,
        variable: &Variable,
        dimensions: &BTreeMap<String, usize>,
    ) -> bool;
}

impl<F> CoordinatePolicy for F
where
    F: Fn(&str, &Variable, &BTreeMap<String, usize>) -> bool + Send + Sync,
{
    fn is_coordinate(
        &self,
        name: &str,
        variable: &Variable,
        dimensions: &BTreeMap<String, usize>,
    ) -> bool {
        self(name, variable, dimensions)
    }
}

/// Variables named after one of the dataset's dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionCoordinates;

impl CoordinatePolicy for DimensionCoordinates {
    fn is_coordinate(&self, name: &str, _: &Variable, dimensions: &BTreeMap<String, usize>) -> bool {
        dimensions.contains_key(name)
    }
}

/// An explicit list of coordinate names (e.g. `lat`, `lon`, `time`).
#[derive(Debug, Clone, Default)]
pub struct NamedCoordinates {
    names: BTreeSet<String>,
}

impl NamedCoordinates {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl CoordinatePolicy for NamedCoordinates {
    fn is_coordinate(&self, name: &str, _: &Variable, _: &BTreeMap<String, usize>) -> bool {
        self.names.contains(name)
    }
}

/// How a variable takes part in precision reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableClass {
    /// Coordinate axis; kept exact.
    Coordinate,
    /// Named in the always-exempt set; kept exact.
    Preserved,
    /// Candidate for rounding.
    Data,
}

/// Coordinate checks plus an always-exempt name set.
pub struct ClassificationPolicy {
    coordinates: Vec<Box<dyn CoordinatePolicy>>,
    preserved: BTreeSet<String>,
}

impl ClassificationPolicy {
    /// A policy with no coordinate checks and nothing preserved.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            coordinates: Vec::new(),
            preserved: BTreeSet::new(),
        }
    }

    /// Add a coordinate check; a variable is a coordinate if any check says so.
    #[must_use]
    pub fn with_coordinate_policy(mut self, policy: impl CoordinatePolicy + 'static) -> Self {
        self.coordinates.push(Box::new(policy));
        self
    }

    /// Treat the given names as coordinates.
    #[must_use]
    pub fn with_coordinate_names<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.with_coordinate_policy(NamedCoordinates::new(names))
    }

    /// Always keep the given names exact.
    #[must_use]
    pub fn with_preserved<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.preserved.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn preserved(&self) -> &BTreeSet<String> {
        &self.preserved
    }

    /// Classify one variable.
    pub fn classify(
        &self,
        name: &str,
        variable: &Variable,
        dimensions: &BTreeMap<String, usize>,
    ) -> VariableClass {
        if self
            .coordinates
            .iter()
            .any(|p| p.is_coordinate(name, variable, dimensions))
        {
            VariableClass::Coordinate
        } else if self.preserved.contains(name) {
            VariableClass::Preserved
        } else {
            VariableClass::Data
        }
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::empty().with_coordinate_policy(DimensionCoordinates)
    }
}

impl fmt::Debug for ClassificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationPolicy")
            .field("coordinate_checks", &self.coordinates.len())
            .field("preserved", &self.preserved)
            .finish()
    }
}
