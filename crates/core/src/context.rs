//! Shared state threaded through every engine call.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::catalog::ToolCatalog;
use crate::descriptor::ToolDescriptor;
use crate::layout::CacheLayout;
use crate::platform::Platform;
use crate::{Error, Result};

type ProvisionKey = (String, String);

/// Cache root, platform, catalog and the augmented search path.
///
/// The search path starts as a copy of the process `PATH` and grows as tools
/// are provisioned. It is handed to child processes explicitly; the
/// process environment itself is never modified.
#[derive(Debug)]
pub struct ProvisioningContext {
    layout: CacheLayout,
    platform: Platform,
    catalog: ToolCatalog,
    search_path: RwLock<Vec<PathBuf>>,
    provision_locks: Mutex<HashMap<ProvisionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProvisioningContext {
    /// Create a context whose search path is seeded from `PATH`.
    #[must_use]
    pub fn new(layout: CacheLayout, platform: Platform, catalog: ToolCatalog) -> Self {
        let inherited = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        Self::with_search_path(layout, platform, catalog, inherited)
    }

    /// Create a context with an explicit initial search path.
    #[must_use]
    pub fn with_search_path(
        layout: CacheLayout,
        platform: Platform,
        catalog: ToolCatalog,
        search_path: Vec<PathBuf>,
    ) -> Self {
        Self {
            layout,
            platform,
            catalog,
            search_path: RwLock::new(search_path),
            provision_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Cache layout.
    #[must_use]
    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Platform descriptors are resolved for.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Tool catalog.
    #[must_use]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Snapshot of the augmented search path.
    #[must_use]
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.search_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Put `dir` in front of the search path unless it is already listed.
    ///
    /// Returns whether the path changed.
    pub fn prepend_search_path(&self, dir: &Path) -> bool {
        let mut paths = self
            .search_path
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if paths.iter().any(|p| p == dir) {
            return false;
        }
        paths.insert(0, dir.to_path_buf());
        tracing::debug!(path = %dir.display(), "Prepended to search path");
        true
    }

    /// Search path joined for use as a `PATH` value.
    pub fn search_path_env(&self) -> Result<OsString> {
        std::env::join_paths(self.search_path())
            .map_err(|e| Error::io_no_path(std::io::Error::other(e), "join search path"))
    }

    /// Lock serialising provisioning of one (tool, release) pair.
    #[must_use]
    pub fn provision_lock(&self, descriptor: &ToolDescriptor) -> Arc<tokio::sync::Mutex<()>> {
        let key = (descriptor.name.clone(), descriptor.release.clone());
        let mut locks = self
            .provision_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }
}
