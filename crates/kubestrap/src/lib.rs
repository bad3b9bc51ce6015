//! kubestrap command-line front end.
//!
//! The binary parses [`cli::Cli`], installs tracing and hands the command to
//! [`commands::execute`]. Everything that touches tools goes through
//! [`kubestrap_engine::Engine`].

pub mod cli;
pub mod commands;
pub mod tracing;

pub use cli::{Cli, CliError, exit_code_for, render_error};
