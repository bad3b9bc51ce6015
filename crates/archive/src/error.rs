//! Error types for archive extraction.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while extracting an archive.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Destination exists and is not a directory.
    #[error("Destination '{}' exists and is not a directory", path.display())]
    #[diagnostic(code(kubestrap::archive::destination))]
    DestinationNotDirectory {
        /// The destination path.
        path: Box<Path>,
    },

    /// Content matches none of the supported formats.
    #[error("Unrecognised archive format: {}", path.display())]
    #[diagnostic(
        code(kubestrap::archive::format),
        help("Supported formats are zip, tar, gzip and zstd")
    )]
    UnknownFormat {
        /// The archive path.
        path: Box<Path>,
    },

    /// No member matched the selection.
    #[error(
        "no files extracted from '{}'. List to extract: {members:?}. Pattern to extract: {pattern}",
        archive.display()
    )]
    #[diagnostic(
        code(kubestrap::archive::empty),
        help("Check the 'extract' list and pattern against the archive contents")
    )]
    NothingExtracted {
        /// The archive path.
        archive: Box<Path>,
        /// Requested member names.
        members: Vec<String>,
        /// Requested member pattern.
        pattern: String,
    },

    /// Member path would escape the destination.
    #[error("Archive member '{entry}' escapes the destination directory")]
    #[diagnostic(code(kubestrap::archive::unsafe_path))]
    UnsafePath {
        /// The member name as stored in the archive.
        entry: String,
    },

    /// Member pattern is not a valid regular expression.
    #[error("Invalid member pattern '{pattern}'")]
    #[diagnostic(code(kubestrap::archive::pattern))]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },

    /// Zip container could not be read.
    #[error("Failed to read zip archive '{}'", path.display())]
    #[diagnostic(code(kubestrap::archive::zip))]
    Zip {
        /// The archive path.
        path: Box<Path>,
        /// Zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// IO error.
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(code(kubestrap::archive::io))]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available.
        path: Option<Box<Path>>,
        /// Operation that failed.
        operation: String,
    },
}

impl Error {
    /// Create an I/O error with path context.
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

    /// Create an I/O error without path context.
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }
}
