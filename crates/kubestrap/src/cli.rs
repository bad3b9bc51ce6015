//! Command-line definition, error type and exit codes.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use miette::{Diagnostic, Report};
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};

/// Success exit code
pub const EXIT_OK: i32 = 0;

/// Unexpected failure exit code
pub const EXIT_FAILURE: i32 = 1;

/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;

/// CLI-specific error types with exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(kubestrap::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },

    /// Failure reported by the engine
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] kubestrap_core::Error),

    /// Other unexpected error (exit code 1)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(kubestrap::cli::other))]
    Other {
        /// The error message
        message: String,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Map CLI error to its exit code.
///
/// A tool that ran and failed hands its own exit code through.
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    use kubestrap_core::Error;
    match err {
        CliError::Config { .. }
        | CliError::Engine(
            Error::Configuration { .. }
            | Error::UnsupportedScheme { .. }
            | Error::UnsupportedPlatform { .. }
            | Error::ToolNotFound { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDuration { .. }
            | Error::InvalidPattern { .. },
        ) => EXIT_CLI,
        CliError::Engine(Error::CommandFailed { exit_code, .. }) if *exit_code > 0 => *exit_code,
        CliError::Engine(_) | CliError::Other { .. } => EXIT_FAILURE,
    }
}

/// Render an error on stderr with miette.
pub fn render_error(err: CliError) {
    let report = Report::new(err);
    // NOTE: tracing may be filtered below error level, so the report is
    // always printed directly.
    #[allow(clippy::print_stderr)]
    {
        eprintln!("{report:?}");
    }
    let _ = io::stderr().flush();
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    kubestrap_core::parse_duration(value).map_err(|e| e.to_string())
}

/// kubestrap command line.
#[derive(Parser, Debug)]
#[command(
    name = "kubestrap",
    version,
    about = "Bootstrap a Kubernetes cluster with version-pinned external tools"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long = "log-level",
        global = true,
        env = "KS_LOG_LEVEL",
        default_value = "info",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long = "log-format",
        global = true,
        env = "KS_LOG_FORMAT",
        default_value = "compact",
        value_enum
    )]
    pub format: TracingFormat,

    /// Configuration files or directories holding kubestrap.yaml.
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        env = "KS_CONFIG",
        value_delimiter = ','
    )]
    pub config: Vec<PathBuf>,

    /// Root of the provisioning cache.
    #[arg(long = "cache-root", global = true, env = "KS_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,
}

impl Cli {
    /// Configuration locations, falling back to the working directory and
    /// the user config directory.
    #[must_use]
    pub fn config_locations(&self) -> Vec<PathBuf> {
        if !self.config.is_empty() {
            return self.config.clone();
        }
        let mut locations = vec![PathBuf::from(".")];
        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("kubestrap"));
        }
        locations
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a catalog tool with its arguments.
    #[command(visible_alias = "r")]
    Raw(RawArgs),

    /// Inspect and provision catalog tools.
    Tools {
        /// Tools subcommand
        #[command(subcommand)]
        subcommand: ToolsCommands,
    },

    /// Show version information.
    Version,
}

/// Arguments of `kubestrap raw`.
#[derive(clap::Args, Debug)]
pub struct RawArgs {
    /// Execution timeout such as 90s or 1m30s; 0 disables it.
    #[arg(short = 't', long, env = "KS_RAW_TIMEOUT", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Print the captured output verbatim instead of logging it line by line.
    #[arg(
        short = 'r',
        long = "raw-output",
        env = "KS_RAW_RAW_OUTPUT",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub raw_output: bool,

    /// Tool name followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "TOOL")]
    pub args: Vec<String>,
}

/// Subcommands of `kubestrap tools`.
#[derive(Subcommand, Debug)]
pub enum ToolsCommands {
    /// List the tool catalog.
    List {
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Provision tools and print their resolved paths.
    Ensure {
        /// Tool names or aliases.
        #[arg(required = true)]
        tools: Vec<String>,

        /// Timeout of each version check.
        #[arg(short = 't', long, value_parser = parse_timeout)]
        timeout: Option<Duration>,
    },

    /// Print a shell line prepending the cached tool directories to PATH.
    Path,
}
