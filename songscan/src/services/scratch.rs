//! Scoped filesystem resources
//!
//! Media files and per-job output directories are owned by `tempfile` guards
//! that remove them on drop, so every exit path of a job cleans up. Removal is
//! best-effort: a path that is already gone is not an error.

use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};

/// A media file deleted when the guard is dropped
///
/// The path may not exist yet; the guard is taken before the first byte is
/// written so a failed write leaves nothing behind. Relative paths are made
/// absolute against the current directory.
#[derive(Debug)]
pub struct TempMedia {
    path: TempPath,
}

impl TempMedia {
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        Ok(Self {
            path: TempPath::try_from_path(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create `<root>/<name>/`, removed recursively when the guard is dropped
///
/// Fails if the directory already exists.
pub fn scratch_dir(root: &Path, name: &str) -> std::io::Result<TempDir> {
    std::fs::create_dir_all(root)?;
    tempfile::Builder::new()
        .prefix(name)
        .rand_bytes(0)
        .tempdir_in(root)
}
