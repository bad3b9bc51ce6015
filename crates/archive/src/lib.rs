//! Archive extraction for kubestrap.
//!
//! Formats are identified by content, never by extension. Zip and tar
//! containers are walked member by member; gzip and zstd streams are
//! decompressed first and either yield an inner tar or a single member.

pub mod error;
mod extract;
pub mod format;

pub use error::{Error, Result};
pub use extract::extract;
pub use format::{Format, detect};
