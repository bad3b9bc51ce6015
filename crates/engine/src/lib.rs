//! External tool execution engine for kubestrap.
//!
//! A logical command flows through three stages:
//!
//! 1. [`Resolver`] accepts an installed, version-checked executable or asks
//!    the [`Fetcher`] to provision one into the cache
//! 2. [`Fetcher`] finds, downloads and unpacks artifacts
//! 3. [`ProcessRunner`] runs the executable under a timeout with buffered or
//!    streamed output, refusing to start a command that is already running
//!
//! [`Engine`] ties them together around a shared [`ProvisioningContext`].

pub mod download;
pub mod fetcher;
pub mod process_table;
pub mod resolver;
pub mod runner;
pub mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kubestrap_core::{Error, ProvisioningContext, Result};

pub use download::{Downloader, HttpDownloader};
pub use fetcher::Fetcher;
pub use resolver::Resolver;
pub use runner::{CaptureMode, ProcessRunner, ProcessStatus, RunOptions, StdinSource};
pub use sink::{OutputSink, Stream, TracingSink};

/// Resolves catalog tools and runs them.
#[derive(Debug, Clone)]
pub struct Engine {
    context: Arc<ProvisioningContext>,
    resolver: Resolver,
    runner: ProcessRunner,
}

impl Engine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        context: Arc<ProvisioningContext>,
        downloader: Arc<dyn Downloader>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let runner = ProcessRunner::new(sink);
        let fetcher = Fetcher::new(Arc::clone(&context), downloader);
        let resolver = Resolver::new(Arc::clone(&context), fetcher, runner.clone());
        Self {
            context,
            resolver,
            runner,
        }
    }

    /// Shared provisioning state.
    #[must_use]
    pub fn context(&self) -> &Arc<ProvisioningContext> {
        &self.context
    }

    /// Resolve the catalog tool `name` without running it.
    pub async fn ensure(&self, name: &str, timeout: Duration) -> Result<PathBuf> {
        let descriptor = self.context.catalog().require(name)?;
        self.resolver.resolve(&descriptor, timeout).await
    }

    /// Run `args`, where `args[0]` names a catalog tool or one of its aliases.
    ///
    /// When only the tool is named, the rest of the descriptor's invocation
    /// template supplies the arguments.
    pub async fn execute(&self, args: &[String], mut options: RunOptions) -> Result<ProcessStatus> {
        let Some((requested, rest)) = args.split_first() else {
            return Err(Error::configuration("", "no command given"));
        };
        let descriptor = self.context.catalog().require(requested)?;
        let primary = self.resolver.resolve(&descriptor, options.timeout).await?;

        let executable = if *requested == descriptor.name {
            primary
        } else {
            self.resolver.lookup(requested)?
        };
        let rest = if rest.is_empty() && descriptor.invocation.len() > 1 {
            &descriptor.invocation[1..]
        } else {
            rest
        };

        if options.search_path.is_none() {
            options.search_path = Some(self.context.search_path_env()?);
        }
        self.runner.run(&executable, rest, options).await
    }

    /// Run `args` buffered and return stdout when the tool succeeds.
    pub async fn capture_stdout(&self, args: &[String], timeout: Duration) -> Result<String> {
        let status = self.execute(args, RunOptions::buffered(timeout)).await?;
        if status.success() {
            return Ok(status.stdout.join("\n"));
        }
        let output = if status.stderr.is_empty() {
            status.stdout.join("\n")
        } else {
            status.stderr.join("\n")
        };
        Err(Error::CommandFailed {
            tool: args.first().cloned().unwrap_or_default(),
            exit_code: status.exit_code,
            output: status.error.unwrap_or(output),
        })
    }
}
