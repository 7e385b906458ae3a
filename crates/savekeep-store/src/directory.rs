// ABOUTME: Chooses the directory save slots live in, falling back to a temp cache when needed.
// ABOUTME: Writability is tested once at startup by writing and deleting a probe file.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

const PROBE_FILE: &str = ".savekeep_probe";

/// Errors that can occur while resolving the save directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no writable save directory: primary {primary} ({primary_error}), fallback {fallback} ({fallback_error})")]
    NotWritable {
        primary: PathBuf,
        primary_error: std::io::Error,
        fallback: PathBuf,
        fallback_error: std::io::Error,
    },
}

/// The directory chosen for save files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveDirectory {
    pub path: PathBuf,
    pub used_fallback: bool,
}

impl SaveDirectory {
    /// Use `primary` if it can be created and written, otherwise `fallback`.
    pub fn resolve(primary: &Path, fallback: &Path) -> Result<Self, DirectoryError> {
        let primary_error = match probe(primary) {
            Ok(()) => {
                tracing::info!(path = %primary.display(), "using save directory");
                return Ok(Self {
                    path: primary.to_path_buf(),
                    used_fallback: false,
                });
            }
            Err(e) => e,
        };

        tracing::warn!(
            primary = %primary.display(),
            fallback = %fallback.display(),
            error = %primary_error,
            "primary save directory not writable, using fallback"
        );

        match probe(fallback) {
            Ok(()) => Ok(Self {
                path: fallback.to_path_buf(),
                used_fallback: true,
            }),
            Err(fallback_error) => Err(DirectoryError::NotWritable {
                primary: primary.to_path_buf(),
                primary_error,
                fallback: fallback.to_path_buf(),
                fallback_error,
            }),
        }
    }
}

fn probe(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(PROBE_FILE);
    fs::write(&probe, b"probe")?;
    fs::remove_file(&probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writable_primary_is_used() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("saves");
        let fallback = dir.path().join("cache");

        let resolved = SaveDirectory::resolve(&primary, &fallback).unwrap();

        assert_eq!(resolved.path, primary);
        assert!(!resolved.used_fallback);
        assert!(primary.exists());
        assert!(!primary.join(PROBE_FILE).exists());
        assert!(!fallback.exists());
    }

    #[test]
    fn unusable_primary_falls_back() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("saves");
        fs::write(&primary, "a file, not a directory").unwrap();
        let fallback = dir.path().join("cache");

        let resolved = SaveDirectory::resolve(&primary, &fallback).unwrap();

        assert_eq!(resolved.path, fallback);
        assert!(resolved.used_fallback);
    }

    #[test]
    fn both_unusable_is_an_error() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("a");
        let fallback = dir.path().join("b");
        fs::write(&primary, "x").unwrap();
        fs::write(&fallback, "x").unwrap();

        let err = SaveDirectory::resolve(&primary, &fallback).unwrap_err();
        assert!(err.to_string().contains("no writable save directory"));
    }
}
