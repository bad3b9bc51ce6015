//! On-disk cache layout.
//!
//! Every (tool, release) pair owns `<root>/bin/<name>/<release>/`.

use std::path::{Path, PathBuf};

use crate::descriptor::ToolDescriptor;

/// Paths of the provisioning cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Create a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default cache root (`~/.cache/kubestrap` on Linux).
    #[must_use]
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("kubestrap")
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every provisioned tool.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Private directory of one tool release.
    ///
    /// An empty release collapses to `<root>/bin/<name>`.
    #[must_use]
    pub fn tool_dir(&self, name: &str, release: &str) -> PathBuf {
        let dir = self.bin_dir().join(name);
        if release.trim().is_empty() {
            dir
        } else {
            dir.join(release)
        }
    }

    /// Private directory of the release `descriptor` pins.
    #[must_use]
    pub fn dir_for(&self, descriptor: &ToolDescriptor) -> PathBuf {
        self.tool_dir(&descriptor.name, &descriptor.release)
    }

    /// Tool directories already present on disk, sorted.
    #[must_use]
    pub fn existing_tool_dirs(&self, catalog: &crate::ToolCatalog) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = catalog
            .iter()
            .map(|d| self.dir_for(d))
            .filter(|d| d.is_dir())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }
}

impl Default for CacheLayout {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}
