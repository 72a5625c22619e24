//! Source loaders for the module graph builder.
//!
//! `SourceLoader` is the seam between graph construction and where module
//! bytes actually live. The builder probes resolver candidates through it,
//! so a loader answers `Ok(None)` for a path that does not exist rather
//! than erroring.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};

/// Serves module bytes for project-root-relative paths.
pub trait SourceLoader {
    /// Returns the file's bytes, or `None` if no file exists at `path`.
    fn load(&self, path: &Path) -> Result<Option<Vec<u8>>, Error>;
}

/// Loads modules from the project directory on disk.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceLoader for FsLoader {
    fn load(&self, path: &Path) -> Result<Option<Vec<u8>>, Error> {
        let full = self.root.join(path);
        if !full.is_file() {
            return Ok(None);
        }
        let content =
            std::fs::read(&full).with_context(|| format!("failed to read '{}'", full.display()))?;
        Ok(Some(content))
    }
}

/// In-memory loader for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryLoader {
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.files.get(path).cloned())
    }
}
