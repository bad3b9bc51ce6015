//! Error types shared by the kubestrap crates

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for tool provisioning and execution
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Descriptor cannot be provisioned on this machine as configured
    #[error("Configuration error for '{tool}': {message}")]
    #[diagnostic(
        code(kubestrap::config),
        help("Check the 'url' and 'cache-path' entries of the utility")
    )]
    Configuration {
        /// Tool the descriptor belongs to
        tool: String,
        /// Error message describing the configuration issue
        message: String,
    },

    /// Source locator uses a scheme the fetcher does not know
    #[error("Scheme '{scheme}' not yet supported in '{locator}'")]
    #[diagnostic(
        code(kubestrap::config::scheme),
        help("Please use 'file', 'http' or 'https'")
    )]
    UnsupportedScheme {
        /// Tool the locator belongs to
        tool: String,
        /// The offending scheme
        scheme: String,
        /// The full locator after placeholder substitution
        locator: String,
    },

    /// Running on an operating system no descriptor can target
    #[error("Unsupported platform '{os}'")]
    #[diagnostic(code(kubestrap::config::platform))]
    UnsupportedPlatform {
        /// Operating system name as reported by the standard library
        os: String,
    },

    /// No catalog entry matches the requested name or alias
    #[error("Command '{name}' is not supported")]
    #[diagnostic(
        code(kubestrap::catalog::not_found),
        help("Perhaps add it to the 'raw.utilities' list of the config?")
    )]
    ToolNotFound {
        /// The requested name
        name: String,
    },

    /// Configuration document could not be read or decoded
    #[error("Invalid configuration{}: {message}", path.as_ref().map_or(String::new(), |p| format!(" in {}", p.display())))]
    #[diagnostic(code(kubestrap::config::parse))]
    InvalidConfig {
        /// Document that failed, if any
        path: Option<Box<Path>>,
        /// Decoder message
        message: String,
    },

    /// Duration string could not be parsed
    #[error("Invalid duration '{value}'")]
    #[diagnostic(
        code(kubestrap::config::duration),
        help("Use values like '90', '500ms', '45s', '1m30s' or '2h'")
    )]
    InvalidDuration {
        /// The rejected input
        value: String,
    },

    /// Extraction pattern is not a valid regular expression
    #[error("Invalid extract pattern '{pattern}' for '{tool}': {message}")]
    #[diagnostic(code(kubestrap::config::pattern))]
    InvalidPattern {
        /// Tool the pattern belongs to
        tool: String,
        /// The rejected pattern
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// Network transfer failed
    #[error("Download of '{url}' failed: {message}")]
    #[diagnostic(
        code(kubestrap::provision::download),
        help("Check network connectivity; the next run will retry the download")
    )]
    Download {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// Archive service failed on a provisioned artifact
    #[error("Failed to extract '{}' for '{tool}'", archive.display())]
    #[diagnostic(code(kubestrap::provision::archive))]
    Archive {
        /// Tool being provisioned
        tool: String,
        /// Artifact that was being unpacked
        archive: Box<Path>,
        /// Underlying archive error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error during provisioning or execution
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(kubestrap::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "stat", "copy", "create")
        operation: String,
    },

    /// The exact same command line is already running
    #[error("'{command}' is already running with PID '{pid}'")]
    #[diagnostic(code(kubestrap::process::duplicate))]
    DuplicateInstance {
        /// Command line that was matched
        command: String,
        /// PID of the running instance
        pid: u32,
    },

    /// Provisioning finished without yielding the expected executable
    #[error("'{executable}' not found after provisioning '{tool}'")]
    #[diagnostic(
        code(kubestrap::provision::missing),
        help("Check the 'extract' settings of the utility")
    )]
    NotFoundAfterProvisioning {
        /// Tool being provisioned
        tool: String,
        /// Expected executable file name
        executable: String,
    },

    /// Executable could not be launched
    #[error("Failed to start '{}'", executable.display())]
    #[diagnostic(code(kubestrap::process::spawn))]
    Spawn {
        /// Executable path
        executable: Box<Path>,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Tool ran but did not succeed
    #[error("'{tool}' exited with code {exit_code}{}", if output.is_empty() { String::new() } else { format!(":\n{output}") })]
    #[diagnostic(code(kubestrap::process::failed))]
    CommandFailed {
        /// Tool that ran
        tool: String,
        /// Exit code, `-1` when terminated
        exit_code: i32,
        /// Captured stderr, or stdout when stderr was empty
        output: String,
    },

    /// Name could not be found on the augmented search path
    #[error("'{name}' not found on the search path")]
    #[diagnostic(code(kubestrap::process::lookup))]
    NotOnSearchPath {
        /// Name that was looked up
        name: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a download error
    #[must_use]
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Wrap an archive service failure
    #[must_use]
    pub fn archive(
        tool: impl Into<String>,
        archive: impl AsRef<Path>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Archive {
            tool: tool.into(),
            archive: archive.as_ref().into(),
            source: Box::new(source),
        }
    }

    /// Create a spawn error
    #[must_use]
    pub fn spawn(executable: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Spawn {
            executable: executable.as_ref().into(),
            source,
        }
    }

    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_config(path: Option<&Path>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            path: path.map(Into::into),
            message: message.into(),
        }
    }

    /// Whether retrying the same call later can succeed.
    ///
    /// Configuration errors are permanent; provisioning and execution
    /// failures may clear up on a later invocation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Configuration { .. }
                | Self::UnsupportedScheme { .. }
                | Self::UnsupportedPlatform { .. }
                | Self::ToolNotFound { .. }
                | Self::InvalidConfig { .. }
                | Self::InvalidDuration { .. }
                | Self::InvalidPattern { .. }
                | Self::NotFoundAfterProvisioning { .. }
        )
    }
}

/// Result type for kubestrap operations
pub type Result<T> = std::result::Result<T, Error>;
