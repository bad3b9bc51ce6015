//! Member selection and extraction.

use flate2::read::GzDecoder;
use regex::Regex;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

use crate::format::{self, Format};
use crate::{Error, Result};

/// Mode given to the single member of a bare compressed stream.
const STREAM_MEMBER_MODE: u32 = 0o755;

/// Extract selected members of `archive` into `dest`.
///
/// A member is kept when its name matches `pattern` (if non-empty) or
/// appears verbatim in `members`. With `strip_path`, directory structure is
/// discarded and files land directly in `dest`. Returns the destination
/// relative names written.
pub fn extract(
    archive: &Path,
    dest: &Path,
    members: &[String],
    pattern: &str,
    strip_path: bool,
) -> Result<Vec<String>> {
    if dest.exists() && !dest.is_dir() {
        return Err(Error::DestinationNotDirectory { path: dest.into() });
    }
    let selector = Selector::new(members, pattern)?;
    std::fs::create_dir_all(dest).map_err(|e| Error::io(e, dest, "create"))?;

    let format = format::detect(archive)?;
    debug!(archive = %archive.display(), %format, dest = %dest.display(), "Extracting");

    let mut extraction = Extraction {
        dest,
        strip_path,
        selector,
        written: Vec::new(),
    };
    let open = || File::open(archive).map_err(|e| Error::io(e, archive, "open"));
    match format {
        Format::Zip => extraction.zip(archive, open()?)?,
        Format::Tar => extraction.tar(archive, open()?)?,
        Format::Gzip => extraction.stream(archive, GzDecoder::new(open()?))?,
        Format::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(open()?)
                .map_err(|e| Error::io(e, archive, "decompress"))?;
            extraction.stream(archive, decoder)?;
        }
    }

    if extraction.written.is_empty() {
        return Err(Error::NothingExtracted {
            archive: archive.into(),
            members: members.to_vec(),
            pattern: pattern.to_string(),
        });
    }
    debug!(count = extraction.written.len(), "Extracted members");
    Ok(extraction.written)
}

struct Selector<'a> {
    members: &'a [String],
    pattern: Option<Regex>,
}

impl<'a> Selector<'a> {
    fn new(members: &'a [String], pattern: &str) -> Result<Self> {
        let pattern = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?)
        };
        Ok(Self { members, pattern })
    }

    fn keeps(&self, name: &str) -> bool {
        let bare = name.trim_start_matches("./");
        self.pattern.as_ref().is_some_and(|re| re.is_match(bare))
            || self
                .members
                .iter()
                .any(|m| m == name || m.trim_start_matches("./") == bare)
    }
}

struct Extraction<'a> {
    dest: &'a Path,
    strip_path: bool,
    selector: Selector<'a>,
    written: Vec<String>,
}

impl Extraction<'_> {
    fn tar<R: Read>(&mut self, archive: &Path, reader: R) -> Result<()> {
        let read_err = |e| Error::io(e, archive, "read tar");
        let mut tar = tar::Archive::new(reader);
        for entry in tar.entries().map_err(read_err)? {
            let mut entry = entry.map_err(read_err)?;
            let name = entry.path().map_err(read_err)?.to_string_lossy().into_owned();
            let kind = entry.header().entry_type();

            if !self.selector.keeps(&name) {
                continue;
            }
            if kind.is_dir() {
                self.directory(&name)?;
                continue;
            }
            if !kind.is_file() {
                trace!(member = %name, ?kind, "Skipping non-file member");
                continue;
            }
            let mode = entry.header().mode().ok();
            self.file(&name, &mut entry, mode)?;
        }
        Ok(())
    }

    fn zip(&mut self, archive: &Path, file: File) -> Result<()> {
        let zip_err = |source| Error::Zip {
            path: archive.into(),
            source,
        };
        let mut zip = zip::ZipArchive::new(file).map_err(zip_err)?;
        for index in 0..zip.len() {
            let mut member = zip.by_index(index).map_err(zip_err)?;
            let name = member.name().to_string();
            if !self.selector.keeps(&name) {
                continue;
            }
            if member.is_dir() {
                self.directory(&name)?;
                continue;
            }
            let mode = member.unix_mode();
            self.file(&name, &mut member, mode)?;
        }
        Ok(())
    }

    /// Decompressed stream: either a tar inside, or a single member.
    fn stream<R: Read>(&mut self, archive: &Path, mut reader: R) -> Result<()> {
        let head = format::read_head(&mut reader).map_err(|e| Error::io(e, archive, "decompress"))?;
        let inner_is_tar = format::is_tar(&head);
        let chained = Cursor::new(head).chain(reader);
        if inner_is_tar {
            return self.tar(archive, chained);
        }

        let name = stream_member_name(archive);
        if self.selector.keeps(&name) {
            let mut chained = chained;
            self.file(&name, &mut chained, Some(STREAM_MEMBER_MODE))?;
        }
        Ok(())
    }

    fn directory(&self, name: &str) -> Result<()> {
        if self.strip_path {
            return Ok(());
        }
        let target = self.dest.join(safe_relative(name)?);
        std::fs::create_dir_all(&target).map_err(|e| Error::io(e, &target, "create"))
    }

    fn file<R: Read>(&mut self, name: &str, reader: &mut R, mode: Option<u32>) -> Result<()> {
        let relative = if self.strip_path {
            Path::new(name)
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| Error::UnsafePath {
                    entry: name.to_string(),
                })?
        } else {
            safe_relative(name)?
        };
        let target = self.dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create"))?;
        }

        let mut out = File::create(&target).map_err(|e| Error::io(e, &target, "create"))?;
        std::io::copy(reader, &mut out).map_err(|e| Error::io(e, &target, "write"))?;
        drop(out);

        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| Error::io(e, &target, "chmod"))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        trace!(member = %name, target = %target.display(), "Extracted member");
        self.written.push(relative.to_string_lossy().into_owned());
        Ok(())
    }
}

/// Member path with `.` components dropped; anything escaping is rejected.
fn safe_relative(name: &str) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath {
                    entry: name.to_string(),
                });
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(Error::UnsafePath {
            entry: name.to_string(),
        });
    }
    Ok(relative)
}

/// Name of the single member of a bare compressed stream: the archive file
/// name without its compression extension.
fn stream_member_name(archive: &Path) -> String {
    let compressed = archive.extension().and_then(|e| e.to_str()).is_some_and(|ext| {
        let ext = ext.to_ascii_lowercase();
        Format::Gzip.extensions().contains(&ext.as_str())
            || Format::Zstd.extensions().contains(&ext.as_str())
    });
    let name = if compressed {
        archive.file_stem()
    } else {
        archive.file_name()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
