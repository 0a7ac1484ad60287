//! Local filesystem storage.
//!
//! Reads name the offending path on failure. Writes go to a temporary file in
//! the destination directory and are renamed into place only once every byte
//! has been written, so a failed run never leaves a partial output behind.

use crate::error::{BitpressError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Read a whole file into memory.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| BitpressError::path(path, e))
}

/// Atomically replace `path` with `data`.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BitpressError::path(dir, e))?;
    tmp.write_all(data).map_err(|e| BitpressError::path(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| BitpressError::path(tmp.path(), e))?;
    // Dropping an unpersisted NamedTempFile removes it.
    tmp.persist(path)
        .map_err(|e| BitpressError::path(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        write_atomic(&path, b"payload").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"payload");

        write_atomic(&path, b"replaced").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"replaced");
    }

    #[test]
    fn test_read_missing_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let err = read_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing.bin"));
    }

    #[test]
    fn test_write_into_missing_dir_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.bin");
        assert!(write_atomic(&path, b"x").is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
