//! Binary cache and fetcher.
//!
//! Provisioning walks a small decision tree over the cache path: a
//! directory already holding every executable is a hit, a plain executable
//! is installed as is, anything else is unpacked. When nothing usable is
//! present the artifact is fetched from the platform locator and the tree is
//! walked again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kubestrap_core::{
    Error, Platform, ProvisioningContext, Result, SourceLocator, ToolDescriptor,
};
use tracing::{debug, info, warn};

use crate::download::Downloader;

/// Provisions tool executables into the cache.
#[derive(Clone)]
pub struct Fetcher {
    context: Arc<ProvisioningContext>,
    downloader: Arc<dyn Downloader>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("cache_root", &self.context.layout().root())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Create a fetcher.
    #[must_use]
    pub fn new(context: Arc<ProvisioningContext>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            context,
            downloader,
        }
    }

    /// Make sure the executables of `descriptor` exist in its cache directory.
    ///
    /// Returns the provisioned files. Callers serialise concurrent calls for
    /// the same tool release through
    /// [`ProvisioningContext::provision_lock`].
    pub async fn ensure_executable(&self, descriptor: &ToolDescriptor) -> Result<Vec<PathBuf>> {
        let platform = *self.context.platform();
        let locator = descriptor.source_for(&platform);
        let tool_dir = self.context.layout().dir_for(descriptor);
        let declared = descriptor.declared_cache_path(&tool_dir);

        if locator.is_none() && declared.is_none() {
            return Err(Error::configuration(
                &descriptor.name,
                format!("no source for '{}' and no cache-path", platform.os),
            ));
        }
        create_private_dir(&tool_dir).await?;

        // Operator-provided artifacts are copied, engine-fetched ones are moved.
        let operator_owned = declared.is_some() || locator.as_ref().is_some_and(SourceLocator::is_local);
        let mut cache_path = declared.unwrap_or_else(|| tool_dir.clone());
        let mut fetched = false;
        let mut downloaded = false;

        loop {
            match tokio::fs::metadata(&cache_path).await {
                Err(e) => {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        warn!(tool = %descriptor.name, path = %cache_path.display(), "Cache path missing, fetching");
                    } else {
                        warn!(tool = %descriptor.name, path = %cache_path.display(), error = %e, "Cache path unusable, fetching");
                    }
                }
                Ok(meta) if meta.is_dir() => {
                    if let Some(files) = present_executables(&cache_path, descriptor, &platform).await {
                        debug!(tool = %descriptor.name, dir = %cache_path.display(), "Cache hit");
                        return Ok(files);
                    }
                    if let Some(inner) = locator
                        .as_ref()
                        .and_then(SourceLocator::file_name)
                        .map(|name| cache_path.join(name))
                        && tokio::fs::try_exists(&inner).await.unwrap_or(false)
                    {
                        debug!(tool = %descriptor.name, path = %inner.display(), "Found cached artifact");
                        cache_path = inner;
                        continue;
                    }
                }
                Ok(_) => {
                    let engine_owned = downloaded || !operator_owned;
                    if is_executable_like(&cache_path, &platform) {
                        let installed = install_executable(
                            &cache_path,
                            &tool_dir.join(descriptor.exe_name(&platform)),
                            !engine_owned,
                        )
                        .await?;
                        return Ok(vec![installed]);
                    }
                    return self
                        .unpack(descriptor, &platform, &cache_path, &tool_dir, engine_owned)
                        .await;
                }
            }

            if fetched {
                return Err(Error::configuration(
                    &descriptor.name,
                    format!("'{}' is not usable after fetching", cache_path.display()),
                ));
            }
            fetched = true;
            cache_path = self.fetch(descriptor, locator.as_ref(), &cache_path).await?;
            downloaded = matches!(locator, Some(SourceLocator::Http(_)));
        }
    }

    /// Obtain the artifact from its locator; returns the new cache path.
    async fn fetch(
        &self,
        descriptor: &ToolDescriptor,
        locator: Option<&SourceLocator>,
        cache_path: &Path,
    ) -> Result<PathBuf> {
        match locator {
            None => Err(Error::configuration(
                &descriptor.name,
                format!(
                    "'{}' is not usable and no source is configured for this platform",
                    cache_path.display()
                ),
            )),
            Some(SourceLocator::File(path)) => {
                let absolute =
                    std::path::absolute(path).map_err(|e| Error::io(e, path, "resolve"))?;
                tokio::fs::metadata(&absolute)
                    .await
                    .map_err(|e| Error::io(e, &absolute, "stat"))?;
                debug!(tool = %descriptor.name, path = %absolute.display(), "Using local source");
                Ok(absolute)
            }
            Some(SourceLocator::Http(url)) => {
                info!(tool = %descriptor.name, release = %descriptor.release, "Provisioning");
                self.downloader.download(url, cache_path).await
            }
            Some(SourceLocator::Unsupported { scheme, locator }) => Err(Error::UnsupportedScheme {
                tool: descriptor.name.clone(),
                scheme: scheme.clone(),
                locator: locator.clone(),
            }),
        }
    }

    async fn unpack(
        &self,
        descriptor: &ToolDescriptor,
        platform: &Platform,
        archive: &Path,
        tool_dir: &Path,
        remove_archive: bool,
    ) -> Result<Vec<PathBuf>> {
        let members = descriptor.extract_members(platform);
        let pattern = descriptor.extract.pattern.clone();
        debug!(tool = %descriptor.name, archive = %archive.display(), ?members, %pattern, "Unpacking");

        let (archive_path, dest) = (archive.to_path_buf(), tool_dir.to_path_buf());
        let written = tokio::task::spawn_blocking(move || {
            kubestrap_archive::extract(&archive_path, &dest, &members, &pattern, true)
        })
        .await
        .map_err(|e| Error::io_no_path(std::io::Error::other(e), "extract"))?
        .map_err(|e| match e {
            kubestrap_archive::Error::InvalidPattern { pattern, source } => Error::InvalidPattern {
                tool: descriptor.name.clone(),
                pattern,
                message: source.to_string(),
            },
            other => Error::archive(&descriptor.name, archive, other),
        })?;

        if remove_archive && !written.iter().any(|name| tool_dir.join(name) == archive) {
            tokio::fs::remove_file(archive)
                .await
                .map_err(|e| Error::io(e, archive, "remove"))?;
        }
        info!(tool = %descriptor.name, files = written.len(), "Unpacked");
        Ok(written.iter().map(|name| tool_dir.join(name)).collect())
    }
}

/// Full paths of the name and every alias when all exist in `dir`.
async fn present_executables(
    dir: &Path,
    descriptor: &ToolDescriptor,
    platform: &Platform,
) -> Option<Vec<PathBuf>> {
    let mut files = Vec::new();
    for name in descriptor.names() {
        let path = dir.join(format!("{name}{}", platform.exe_suffix()));
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            _ => return None,
        }
    }
    Some(files)
}

/// No extension on POSIX, `.exe` on Windows.
fn is_executable_like(path: &Path, platform: &Platform) -> bool {
    let extension = path.extension().and_then(|e| e.to_str());
    match platform.exe_suffix().strip_prefix('.') {
        Some(expected) => extension.is_some_and(|e| e.eq_ignore_ascii_case(expected)),
        None => extension.is_none(),
    }
}

/// Place `source` at `dest` and make it executable.
async fn install_executable(source: &Path, dest: &Path, copy: bool) -> Result<PathBuf> {
    if source != dest {
        if copy {
            tokio::fs::copy(source, dest)
                .await
                .map_err(|e| Error::io(e, dest, "copy"))?;
        } else if let Err(e) = tokio::fs::rename(source, dest).await {
            debug!(error = %e, "Rename failed, copying instead");
            tokio::fs::copy(source, dest)
                .await
                .map_err(|e| Error::io(e, dest, "copy"))?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| Error::io(e, source, "remove"))?;
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| Error::io(e, dest, "chmod"))?;
    }
    debug!(path = %dest.display(), copied = copy, "Installed executable");
    Ok(dest.to_path_buf())
}

async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(dir)
        .await
        .map_err(|e| Error::io(e, dir, "create"))
}
