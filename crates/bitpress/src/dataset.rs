//! In-memory dataset model.
//!
//! A [`Dataset`] maps variable names to [`Variable`]s and carries named
//! dimensions and global attributes. Every variable's dimensions exist in the
//! dimension map with matching sizes; [`Dataset::add_variable`] enforces this.

use bitpress_core::{BitpressError, DType, Result};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute mapping (global or per-variable).
pub type Attributes = BTreeMap<String, AttrValue>;

/// A typed attribute value.
///
/// Floats compare by bit pattern so that a `NaN` fill value equals itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttrValue {
    Text(String),
    Int(i64),
    #[serde(with = "json_float")]
    Float(f64),
    Ints(Vec<i64>),
    #[serde(with = "json_floats")]
    Floats(Vec<f64>),
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Ints(a), Self::Ints(b)) => a == b,
            (Self::Floats(a), Self::Floats(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Ints(v) => write!(f, "{:?}", v),
            Self::Floats(v) => write!(f, "{:?}", v),
        }
    }
}

/// JSON has no NaN or infinity; those are written as strings.
mod json_float {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    pub(super) enum Repr {
        Num(f64),
        Str(String),
    }

    pub(super) fn to_repr(v: f64) -> Repr {
        if v.is_nan() {
            Repr::Str("NaN".to_string())
        } else if v == f64::INFINITY {
            Repr::Str("inf".to_string())
        } else if v == f64::NEG_INFINITY {
            Repr::Str("-inf".to_string())
        } else {
            Repr::Num(v)
        }
    }

    pub(super) fn from_repr<E: serde::de::Error>(repr: Repr) -> Result<f64, E> {
        match repr {
            Repr::Num(v) => Ok(v),
            Repr::Str(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::custom(format!("invalid float attribute: {other}"))),
            },
        }
    }

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        to_repr(*v).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        from_repr(Repr::deserialize(deserializer)?)
    }
}

mod json_floats {
    use super::json_float::{from_repr, to_repr, Repr};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let reprs: Vec<Repr> = v.iter().map(|&x| to_repr(x)).collect();
        reprs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(from_repr)
            .collect()
    }
}

/// Typed N-dimensional element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableData {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int8(ArrayD<i8>),
    UInt8(ArrayD<u8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
}

macro_rules! with_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            VariableData::Float32($arr) => $body,
            VariableData::Float64($arr) => $body,
            VariableData::Int8($arr) => $body,
            VariableData::UInt8($arr) => $body,
            VariableData::Int16($arr) => $body,
            VariableData::Int32($arr) => $body,
            VariableData::Int64($arr) => $body,
        }
    };
}

fn decode_le<T, const N: usize>(bytes: &[u8], from_le: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            from_le(buf)
        })
        .collect()
}

fn shaped<T>(shape: &[usize], values: Vec<T>) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| BitpressError::InvalidFormat(format!("shape {:?}: {}", shape, e)))
}

impl VariableData {
    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
            Self::Int8(_) => DType::Int8,
            Self::UInt8(_) => DType::UInt8,
            Self::Int16(_) => DType::Int16,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
        }
    }

    /// Array shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    /// Whether the array holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements widened to `f64`, in logical (row-major) order.
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_array!(self, a => a.iter().map(|&v| v as f64).collect())
    }

    /// Integer elements widened losslessly to `i128`; `None` for floats.
    #[must_use]
    pub fn to_i128_vec(&self) -> Option<Vec<i128>> {
        match self {
            Self::Float32(_) | Self::Float64(_) => None,
            Self::Int8(a) => Some(a.iter().map(|&v| i128::from(v)).collect()),
            Self::UInt8(a) => Some(a.iter().map(|&v| i128::from(v)).collect()),
            Self::Int16(a) => Some(a.iter().map(|&v| i128::from(v)).collect()),
            Self::Int32(a) => Some(a.iter().map(|&v| i128::from(v)).collect()),
            Self::Int64(a) => Some(a.iter().map(|&v| i128::from(v)).collect()),
        }
    }

    /// Elements as little-endian bytes, in logical (row-major) order.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        with_array!(self, a => a.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    /// Rebuild an array from little-endian bytes.
    pub fn from_le_bytes(dtype: DType, shape: &[usize], bytes: &[u8]) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |n, &d| n.checked_mul(d))
            .and_then(|numel| numel.checked_mul(dtype.size_bytes()))
            .ok_or_else(|| {
                BitpressError::InvalidFormat(format!(
                    "{} array of shape {:?} overflows the address space",
                    dtype, shape
                ))
            })?;
        if bytes.len() != expected {
            return Err(BitpressError::InvalidFormat(format!(
                "{} array of shape {:?} needs {} bytes, got {}",
                dtype,
                shape,
                expected,
                bytes.len()
            )));
        }

        Ok(match dtype {
            DType::Float32 => Self::Float32(shaped(shape, decode_le(bytes, f32::from_le_bytes))?),
            DType::Float64 => Self::Float64(shaped(shape, decode_le(bytes, f64::from_le_bytes))?),
            DType::Int8 => Self::Int8(shaped(shape, decode_le(bytes, i8::from_le_bytes))?),
            DType::UInt8 => Self::UInt8(shaped(shape, bytes.to_vec())?),
            DType::Int16 => Self::Int16(shaped(shape, decode_le(bytes, i16::from_le_bytes))?),
            DType::Int32 => Self::Int32(shaped(shape, decode_le(bytes, i32::from_le_bytes))?),
            DType::Int64 => Self::Int64(shaped(shape, decode_le(bytes, i64::from_le_bytes))?),
        })
    }

    /// Bit-for-bit equality (NaN payloads included).
    #[must_use]
    pub fn bit_eq(&self, other: &Self) -> bool {
        self.dtype() == other.dtype()
            && self.shape() == other.shape()
            && self.to_le_bytes() == other.to_le_bytes()
    }
}

/// One named N-dimensional array with its dimensions and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    dims: Vec<String>,
    data: VariableData,
    attrs: Attributes,
}

impl Variable {
    /// Create a variable; `dims` names each axis of `data` in order.
    pub fn new<S: Into<String>>(
        dims: impl IntoIterator<Item = S>,
        data: VariableData,
    ) -> Result<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != data.shape().len() {
            return Err(BitpressError::Validation(format!(
                "{} dimension names for a {}-dimensional array",
                dims.len(),
                data.shape().len()
            )));
        }
        Ok(Self {
            dims,
            data,
            attrs: Attributes::new(),
        })
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    #[must_use]
    pub fn data(&self) -> &VariableData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut VariableData {
        &mut self.data
    }

    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn is_float(&self) -> bool {
        self.dtype().is_float()
    }

    /// Position of the named dimension, if this variable spans it.
    #[must_use]
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }
}

/// A collection of named variables over named dimensions, with global attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    dimensions: BTreeMap<String, usize>,
    variables: BTreeMap<String, Variable>,
    attrs: Attributes,
}

impl Dataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension; redeclaring with a different size is an error.
    pub fn add_dimension(&mut self, name: impl Into<String>, size: usize) -> Result<()> {
        let name = name.into();
        match self.dimensions.get(&name) {
            Some(&existing) if existing != size => Err(BitpressError::Validation(format!(
                "dimension '{}' already has size {}, not {}",
                name, existing, size
            ))),
            _ => {
                self.dimensions.insert(name, size);
                Ok(())
            }
        }
    }

    /// Insert or replace a variable, registering any new dimensions it spans.
    pub fn add_variable(&mut self, name: impl Into<String>, variable: Variable) -> Result<()> {
        let name = name.into();
        for (i, (dim, &size)) in variable.dims.iter().zip(variable.shape()).enumerate() {
            let repeated = variable.dims[..i]
                .iter()
                .zip(variable.shape())
                .find(|(earlier, _)| *earlier == dim);
            if let Some((_, &earlier)) = repeated {
                if earlier != size {
                    return Err(BitpressError::Validation(format!(
                        "variable '{}': dimension '{}' appears with sizes {} and {}",
                        name, dim, earlier, size
                    )));
                }
            }
            if let Some(&existing) = self.dimensions.get(dim) {
                if existing != size {
                    return Err(BitpressError::Validation(format!(
                        "variable '{}': dimension '{}' has size {}, dataset declares {}",
                        name, dim, size, existing
                    )));
                }
            }
        }
        for (dim, &size) in variable.dims.iter().zip(variable.shape()) {
            self.dimensions.insert(dim.clone(), size);
        }
        self.variables.insert(name, variable);
        Ok(())
    }

    /// Set a global attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Check that every variable's dimensions are declared with matching sizes.
    pub fn validate(&self) -> Result<()> {
        for (name, var) in &self.variables {
            for (dim, &size) in var.dims.iter().zip(var.shape()) {
                match self.dimensions.get(dim) {
                    Some(&declared) if declared == size => {}
                    Some(&declared) => {
                        return Err(BitpressError::Validation(format!(
                            "variable '{}': dimension '{}' has size {}, dataset declares {}",
                            name, dim, size, declared
                        )))
                    }
                    None => {
                        return Err(BitpressError::Validation(format!(
                            "variable '{}' uses undeclared dimension '{}'",
                            name, dim
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn dimensions(&self) -> &BTreeMap<String, usize> {
        &self.dimensions
    }

    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    pub(crate) fn variables_mut(&mut self) -> &mut BTreeMap<String, Variable> {
        &mut self.variables
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Variable names in canonical (sorted) order.
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }
}
