//! Canonical container format (`.bpds` - bitpress dataset).
//!
//! A self-describing byte layout for a [`Dataset`]. Serialization is
//! deterministic: the same dataset always yields the same bytes, which is what
//! the compressor wraps.
//!
//! ## Format
//!
//! ```text
//! BPDS File Format:
//! ┌─────────────────────────────────────────┐
//! │ Magic: "BPDS" (4 bytes)                 │
//! ├─────────────────────────────────────────┤
//! │ Version: u32 (4 bytes, little-endian)   │
//! ├─────────────────────────────────────────┤
//! │ Header Size: u64 (8 bytes, LE)          │
//! ├─────────────────────────────────────────┤
//! │ JSON Header                             │
//! │ - dimensions and their sizes            │
//! │ - global attributes                     │
//! │ - per variable: dtype, dims, shape,     │
//! │   attributes, offsets into data         │
//! ├─────────────────────────────────────────┤
//! │ Data                                    │
//! │ - little-endian elements, row-major     │
//! │ - variables concatenated in name order  │
//! └─────────────────────────────────────────┘
//! ```

use bitpress_core::storage;
use bitpress_core::{BitpressError, DType, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::dataset::{Attributes, Dataset, Variable, VariableData};

/// Magic bytes for the container format: "BPDS"
pub const MAGIC: [u8; 4] = *b"BPDS";

/// Current container format version
pub const VERSION: u32 = 1;

const PREAMBLE_SIZE: usize = 4 + 4 + 8;

/// JSON header of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerHeader {
    dimensions: BTreeMap<String, usize>,
    #[serde(default)]
    attributes: Attributes,
    variables: BTreeMap<String, VariableHeader>,
}

/// Per-variable header entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VariableHeader {
    dtype: String,
    dims: Vec<String>,
    shape: Vec<usize>,
    #[serde(default)]
    attributes: Attributes,
    data_offsets: [usize; 2],
}

/// Check whether bytes start with the container magic.
#[must_use]
pub fn is_container(bytes: &[u8]) -> bool {
    bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] == MAGIC
}

/// Serialize a dataset to canonical container bytes.
pub fn to_bytes(dataset: &Dataset) -> Result<Vec<u8>> {
    dataset.validate()?;

    let mut variables = BTreeMap::new();
    let mut payloads = Vec::with_capacity(dataset.variables().len());
    let mut offset = 0usize;

    for (name, var) in dataset.variables() {
        let bytes = var.data().to_le_bytes();
        let end = offset + bytes.len();
        variables.insert(
            name.clone(),
            VariableHeader {
                dtype: var.dtype().as_str().to_string(),
                dims: var.dims().to_vec(),
                shape: var.shape().to_vec(),
                attributes: var.attrs().clone(),
                data_offsets: [offset, end],
            },
        );
        offset = end;
        payloads.push(bytes);
    }

    let header = ContainerHeader {
        dimensions: dataset.dimensions().clone(),
        attributes: dataset.attrs().clone(),
        variables,
    };
    let header_json = serde_json::to_vec(&header)
        .map_err(|e| BitpressError::InvalidFormat(format!("Failed to serialize header: {}", e)))?;

    let mut out = Vec::with_capacity(PREAMBLE_SIZE + header_json.len() + offset);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(header_json.len() as u64).to_le_bytes());
    out.extend_from_slice(&header_json);
    for payload in payloads {
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

/// Parse canonical container bytes back into a dataset.
pub fn from_bytes(bytes: &[u8]) -> Result<Dataset> {
    if bytes.len() < PREAMBLE_SIZE {
        return Err(BitpressError::InvalidFormat(format!(
            "File too small: {} bytes",
            bytes.len()
        )));
    }
    if !is_container(bytes) {
        return Err(BitpressError::InvalidFormat(
            "Invalid magic bytes, not a BPDS container".to_string(),
        ));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != VERSION {
        return Err(BitpressError::InvalidFormat(format!(
            "Unsupported container version: {}",
            version
        )));
    }

    let mut size_buf = [0u8; 8];
    size_buf.copy_from_slice(&bytes[8..16]);
    let header_size = u64::from_le_bytes(size_buf);
    let header_end = usize::try_from(header_size)
        .ok()
        .and_then(|n| n.checked_add(PREAMBLE_SIZE))
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            BitpressError::InvalidFormat("Header size exceeds file size".to_string())
        })?;

    let header: ContainerHeader = serde_json::from_slice(&bytes[PREAMBLE_SIZE..header_end])
        .map_err(|e| BitpressError::InvalidFormat(format!("Invalid JSON header: {}", e)))?;
    let data = &bytes[header_end..];

    let mut dataset = Dataset::new();
    for (name, &size) in &header.dimensions {
        dataset.add_dimension(name.clone(), size).map_err(malformed)?;
    }
    *dataset.attrs_mut() = header.attributes;

    for (name, info) in header.variables {
        let dtype: DType = info.dtype.parse()?;
        let [start, end] = info.data_offsets;
        if start > end || end > data.len() {
            return Err(BitpressError::InvalidFormat(format!(
                "Data offsets [{}, {}] for '{}' out of range ({} data bytes)",
                start,
                end,
                name,
                data.len()
            )));
        }

        let values = VariableData::from_le_bytes(dtype, &info.shape, &data[start..end])?;
        let mut variable = Variable::new(info.dims, values).map_err(malformed)?;
        *variable.attrs_mut() = info.attributes;
        dataset.add_variable(name, variable).map_err(malformed)?;
    }

    Ok(dataset)
}

/// A header that decodes but describes an impossible dataset is a format error.
fn malformed(err: BitpressError) -> BitpressError {
    match err {
        BitpressError::Validation(msg) => BitpressError::InvalidFormat(msg),
        other => other,
    }
}

/// Read and parse a container file.
pub fn read_file(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let bytes = storage::read_file(path)?;
    from_bytes(&bytes).map_err(|e| match e {
        BitpressError::InvalidFormat(msg) => {
            BitpressError::InvalidFormat(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Serialize a dataset and atomically write it to `path`.
pub fn write_file(path: impl AsRef<Path>, dataset: &Dataset) -> Result<()> {
    let bytes = to_bytes(dataset)?;
    storage::write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::AttrValue;
    use ndarray::{Array1, Array2, ArrayD, IxDyn};

    fn sample() -> Dataset {
        let mut ds = Dataset::new();
        ds.set_attr("title", "sample run");
        ds.set_attr("missing_value", f64::NAN);

        let lat = Array1::linspace(-45.0f64, 45.0, 4).into_dyn();
        let lon = Array1::linspace(0.0f64, 350.0, 8).into_dyn();
        let temp = Array2::from_shape_fn((4, 8), |(i, j)| 270.0 + i as f32 + 0.5 * j as f32);

        ds.add_variable("lat", Variable::new(["lat"], VariableData::Float64(lat)).unwrap())
            .unwrap();
        ds.add_variable("lon", Variable::new(["lon"], VariableData::Float64(lon)).unwrap())
            .unwrap();
        ds.add_variable(
            "temp",
            Variable::new(["lat", "lon"], VariableData::Float32(temp.into_dyn()))
                .unwrap()
                .with_attr("units", "K")
                .with_attr("_FillValue", AttrValue::Float(f64::NAN)),
        )
        .unwrap();
        ds.add_variable(
            "time",
            Variable::new(
                ["time"],
                VariableData::Int64(ArrayD::from_shape_vec(IxDyn(&[2]), vec![0, 86_400]).unwrap()),
            )
            .unwrap()
            .with_attr("units", "seconds since 2000-01-01"),
        )
        .unwrap();
        ds
    }

    #[test]
    fn test_roundtrip_preserves_everything() {
        let ds = sample();
        let bytes = to_bytes(&ds).unwrap();
        assert!(is_container(&bytes));

        let back = from_bytes(&bytes).unwrap();
        assert_eq!(back.dimensions(), ds.dimensions());
        assert_eq!(back.attrs(), ds.attrs());
        for (name, var) in ds.variables() {
            let other = back.variable(name).unwrap();
            assert_eq!(other.dims(), var.dims());
            assert_eq!(other.attrs(), var.attrs());
            assert!(other.data().bit_eq(var.data()), "{name}");
        }
    }

    #[test]
    fn test_serialization_is_canonical() {
        let ds = sample();
        let a = to_bytes(&ds).unwrap();
        let b = to_bytes(&from_bytes(&a).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimension_without_variable_survives() {
        let mut ds = sample();
        ds.add_dimension("bnds", 2).unwrap();
        let back = from_bytes(&to_bytes(&ds).unwrap()).unwrap();
        assert_eq!(back.dimensions().get("bnds"), Some(&2));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = to_bytes(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(BitpressError::InvalidFormat(_))));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = to_bytes(&sample()).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        let err = from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let bytes = to_bytes(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(from_bytes(truncated), Err(BitpressError::InvalidFormat(_))));
    }

    fn raw_container(header: &serde_json::Value, data: &[u8]) -> Vec<u8> {
        let json = serde_json::to_vec(header).unwrap();
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(json.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&json);
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn test_rejects_overflowing_shape() {
        let header = serde_json::json!({
            "dimensions": {"a": 1usize << 62, "b": 8},
            "attributes": {},
            "variables": {
                "v": {
                    "dtype": "F64",
                    "dims": ["a", "b"],
                    "shape": [1usize << 62, 8],
                    "attributes": {},
                    "data_offsets": [0, 0]
                }
            }
        });
        let err = from_bytes(&raw_container(&header, &[])).unwrap_err();
        assert!(matches!(err, BitpressError::InvalidFormat(_)), "{err}");
    }

    #[test]
    fn test_rejects_inconsistent_dimensions() {
        let header = serde_json::json!({
            "dimensions": {"x": 3},
            "attributes": {},
            "variables": {
                "v": {
                    "dtype": "U8",
                    "dims": ["x"],
                    "shape": [2],
                    "attributes": {},
                    "data_offsets": [0, 2]
                }
            }
        });
        let err = from_bytes(&raw_container(&header, &[1, 2])).unwrap_err();
        assert!(matches!(err, BitpressError::InvalidFormat(_)), "{err}");
    }

    #[test]
    fn test_rejects_header_overrun() {
        let mut bytes = to_bytes(&sample()).unwrap();
        bytes[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(from_bytes(&bytes).is_err());
        assert!(from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bpds");
        let ds = sample();

        write_file(&path, &ds).unwrap();
        let back = read_file(&path).unwrap();
        assert_eq!(to_bytes(&back).unwrap(), to_bytes(&ds).unwrap());
    }

    #[test]
    fn test_read_missing_file_names_path() {
        let err = read_file("/definitely/not/here.bpds").unwrap_err();
        assert!(err.to_string().contains("here.bpds"));
    }
}
