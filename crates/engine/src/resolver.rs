//! Resolution of a descriptor to a version-checked executable.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kubestrap_core::{Error, ProvisioningContext, Result, ToolDescriptor};
use tracing::{debug, warn};

use crate::fetcher::Fetcher;
use crate::runner::{ProcessRunner, RunOptions, StdinSource};

/// Finds an acceptable executable for a descriptor, provisioning it when needed.
#[derive(Debug, Clone)]
pub struct Resolver {
    context: Arc<ProvisioningContext>,
    fetcher: Fetcher,
    runner: ProcessRunner,
}

impl Resolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(context: Arc<ProvisioningContext>, fetcher: Fetcher, runner: ProcessRunner) -> Self {
        Self {
            context,
            fetcher,
            runner,
        }
    }

    /// Path of an executable for `descriptor`.
    ///
    /// An installation already on the search path is accepted when its
    /// version probe succeeds, mentions the expected release and every alias
    /// resolves too. Otherwise the tool is provisioned into the cache.
    pub async fn resolve(&self, descriptor: &ToolDescriptor, timeout: Duration) -> Result<PathBuf> {
        let tool_dir = self.context.layout().dir_for(descriptor);
        self.context.prepend_search_path(&tool_dir);

        if let Some(path) = self.accept_installed(descriptor, timeout).await {
            debug!(tool = %descriptor.name, path = %path.display(), "Using installed executable");
            return Ok(path);
        }
        self.provision(descriptor).await
    }

    /// Look `name` up on the augmented search path.
    pub fn lookup(&self, name: &str) -> Result<PathBuf> {
        let search_path = self.context.search_path_env()?;
        let cwd = std::env::current_dir().map_err(|e| Error::io_no_path(e, "current dir"))?;
        which::which_in(name, Some(search_path), cwd).map_err(|_| Error::NotOnSearchPath {
            name: name.to_string(),
        })
    }

    async fn accept_installed(&self, descriptor: &ToolDescriptor, timeout: Duration) -> Option<PathBuf> {
        let found = self.lookup(&descriptor.name).ok()?;
        let options = RunOptions::buffered(timeout)
            .with_stdin(StdinSource::Null)
            .with_search_path(self.context.search_path_env().ok()?);

        let status = match self.runner.run(&found, &descriptor.probe_args(), options).await {
            Ok(status) => status,
            Err(e) => {
                warn!(tool = %descriptor.name, error = %e, "Version check failed");
                return None;
            }
        };
        if let Some(error) = &status.error {
            warn!(tool = %descriptor.name, %error, "Version check failed");
            return None;
        }
        if !status.completed || status.exit_code != 0 {
            warn!(
                tool = %descriptor.name,
                exit_code = status.exit_code,
                stderr = %status.stderr.join("\n"),
                "Version check failed"
            );
            return None;
        }

        // Some tools print their version on stderr.
        let output = status.combined_output();
        if !output.contains(&descriptor.release) {
            warn!(
                tool = %descriptor.name,
                release = %descriptor.release,
                %output,
                "Release was not matched in version command output"
            );
            return None;
        }

        if let Some(missing) = descriptor.aliases.iter().find(|alias| self.lookup(alias).is_err()) {
            warn!(tool = %descriptor.name, alias = %missing, "Alias not found on the search path");
            return None;
        }
        Some(found)
    }

    async fn provision(&self, descriptor: &ToolDescriptor) -> Result<PathBuf> {
        let lock = self.context.provision_lock(descriptor);
        let _guard = lock.lock().await;

        let files = self.fetcher.ensure_executable(descriptor).await?;
        let exe_name = descriptor.exe_name(self.context.platform());
        let executable = files
            .into_iter()
            .find(|f| f.file_name() == Some(OsStr::new(&exe_name)))
            .ok_or_else(|| Error::NotFoundAfterProvisioning {
                tool: descriptor.name.clone(),
                executable: exe_name,
            })?;

        if let Some(dir) = executable.parent() {
            self.context.prepend_search_path(dir);
        }
        Ok(executable)
    }
}
