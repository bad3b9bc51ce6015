//! Format identification by magic bytes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{Error, Result};

/// Bytes needed to recognise every supported format.
pub const SNIFF_LEN: usize = 512;

const ZIP_LOCAL: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY: &[u8] = b"PK\x05\x06";
const GZIP: &[u8] = &[0x1f, 0x8b];
const ZSTD: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

/// Supported container and compression formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Zip container
    Zip,
    /// POSIX or GNU tar container
    Tar,
    /// Single gzip stream
    Gzip,
    /// Single zstd frame sequence
    Zstd,
}

impl Format {
    /// Identify the format from the first bytes of a file.
    #[must_use]
    pub fn sniff(head: &[u8]) -> Option<Self> {
        if head.starts_with(ZIP_LOCAL) || head.starts_with(ZIP_EMPTY) {
            Some(Self::Zip)
        } else if head.starts_with(GZIP) {
            Some(Self::Gzip)
        } else if head.starts_with(ZSTD) {
            Some(Self::Zstd)
        } else if is_tar(head) {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Whether the format is a pure decompressor without named members.
    #[must_use]
    pub fn is_compression(self) -> bool {
        matches!(self, Self::Gzip | Self::Zstd)
    }

    /// File extensions conventionally used for the format.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Zip => &["zip"],
            Self::Tar => &["tar"],
            Self::Gzip => &["gz", "gzip", "tgz"],
            Self::Zstd => &["zst", "zstd", "tzst"],
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        })
    }
}

/// Whether `head` carries a ustar header magic.
#[must_use]
pub fn is_tar(head: &[u8]) -> bool {
    head.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()) == Some(TAR_MAGIC)
}

/// Identify the format of the file at `path`.
pub fn detect(path: &Path) -> Result<Format> {
    let file = File::open(path).map_err(|e| Error::io(e, path, "open"))?;
    let head = read_head(file).map_err(|e| Error::io(e, path, "read"))?;
    Format::sniff(&head).ok_or_else(|| Error::UnknownFormat { path: path.into() })
}

/// Read up to [`SNIFF_LEN`] bytes.
pub(crate) fn read_head<R: Read>(reader: R) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    reader.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}
