//! Guards against overwriting an input file with generated output.
//!
//! The raw exports are expensive to re-fetch, so every binary validates its
//! output path before creating the file.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// File name fragments of the raw exports. An output never carries these.
pub const SOURCE_PATTERNS: [&str; 3] = ["Steam_data", "OpenCritic_data", "hltb_dataset"];

/// Absolute, symlink-free form of `path`. A file that does not exist yet is
/// resolved through its parent directory.
pub fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output is not a directory
/// - Output is not the same file as any of `source_paths`
/// - Output file name does not look like one of the raw exports
pub fn validate_output_path(output: &Path, source_paths: &[&Path]) -> Result<()> {
    if output.is_dir() {
        bail!(
            "Safety check failed: output '{}' is a directory",
            output.display()
        );
    }

    let output_canonical = canonical(output);
    for source in source_paths {
        if output == *source || output_canonical == canonical(source) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");
    for pattern in SOURCE_PATTERNS {
        if output_name.contains(pattern) {
            bail!(
                "Safety check failed: output '{}' matches source file pattern '{}'",
                output.display(),
                pattern
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_output() {
        let output = PathBuf::from("/tmp/merged_games.csv");
        let source = PathBuf::from("/data/Steam_data.csv");
        assert!(validate_output_path(&output, &[&source]).is_ok());
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/merged_games.csv");
        let result = validate_output_path(&path, &[&path]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_same_file_through_different_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.csv");
        std::fs::write(&source, "id\n").unwrap();
        let spelled = dir.path().join(".").join("input.csv");
        assert!(validate_output_path(&spelled, &[&source]).is_err());
    }

    #[test]
    fn test_canonical_of_missing_file_resolves_parent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(".").join("not_yet.csv");
        let expected = dir.path().canonicalize().unwrap().join("not_yet.csv");
        assert_eq!(canonical(&missing), expected);
    }

    #[test]
    fn test_source_pattern_blocked() {
        let output = PathBuf::from("/tmp/hltb_dataset_v2.csv");
        let source = PathBuf::from("/data/other.csv");
        let result = validate_output_path(&output, &[&source]);
        assert!(result.unwrap_err().to_string().contains("hltb_dataset"));
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(dir.path(), &[]).is_err());
    }
}
