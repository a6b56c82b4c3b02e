//! Utility functions for marksearch.

use std::fs;
use std::path::Path;

use crate::error::{Result, SearchError};

/// Read a file into a string, refusing files larger than `max_size` bytes.
///
/// # Errors
///
/// Returns an ingest error if the file cannot be read, is not UTF-8, or
/// exceeds `max_size`.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| {
        SearchError::ingest(format!(
            "Failed to read file metadata {}: {}",
            path.display(),
            e
        ))
    })?;

    let size = metadata.len();
    if size > max_size {
        return Err(SearchError::ingest(format!(
            "File {} is too large ({} bytes, max {} bytes)",
            path.display(),
            size,
            max_size
        )));
    }

    fs::read_to_string(path)
        .map_err(|e| SearchError::ingest(format!("Failed to read {}: {}", path.display(), e)))
}

/// Whether `path` has one of `extensions` (case-insensitive, no leading dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_to_string_with_limit_nonexistent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.md");

        let result = read_to_string_with_limit(&path, 100);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read file metadata"));
    }

    #[test]
    fn test_read_to_string_with_limit_exceeds() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("large.md");

        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[b'x'; 1000]).unwrap();

        let err = read_to_string_with_limit(&path, 500).unwrap_err().to_string();
        assert!(err.contains("too large"));
        assert!(err.contains("1000 bytes"));
        assert!(err.contains("max 500 bytes"));
    }

    #[test]
    fn test_read_to_string_with_limit_at_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boundary.md");
        fs::write(&path, "x".repeat(100)).unwrap();

        assert!(read_to_string_with_limit(&path, 100).is_ok());
        assert!(read_to_string_with_limit(&path, 99).is_err());
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("binary.md");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        assert!(read_to_string_with_limit(&path, 100).is_err());
    }

    #[test]
    fn test_has_extension() {
        let md = vec!["md".to_string()];
        assert!(has_extension(Path::new("/a/README.md"), &md));
        assert!(has_extension(Path::new("notes.MD"), &md));
        assert!(!has_extension(Path::new("notes.markdown"), &md));
        assert!(!has_extension(Path::new("Makefile"), &md));
    }
}
