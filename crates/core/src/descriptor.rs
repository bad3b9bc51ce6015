//! Tool descriptors: one wrapped external command described as data.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::platform::{Os, Platform};

/// Argument the version probe uses when none is configured.
pub const DEFAULT_VERSION_ARG: &str = "version";

/// Static configuration for one logical command.
///
/// Descriptors are decoded once from configuration and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolDescriptor {
    /// Unique identifier, also the expected executable basename
    pub name: String,

    /// Alternate names shipped with, and invoked like, this tool
    #[serde(default, rename = "additional")]
    pub aliases: Vec<String>,

    /// Argument vector skeleton; the first element is replaced by the resolved executable
    #[serde(default, rename = "command", deserialize_with = "string_or_list")]
    pub invocation: Vec<String>,

    /// Arguments asking the tool for its version
    #[serde(default, deserialize_with = "string_or_list")]
    pub version_command: Vec<String>,

    /// Substring expected in the version probe output
    #[serde(default)]
    pub release: String,

    /// Source locator template per operating system
    #[serde(default, rename = "url")]
    pub sources: SourceTable,

    /// Pre-declared artifact location, absolute or relative to the tool's cache directory
    #[serde(default)]
    pub cache_path: String,

    /// Archive members to keep when the artifact is an archive
    #[serde(default)]
    pub extract: ExtractSpec,

    /// Short description shown in listings
    #[serde(default)]
    pub help: String,
}

/// Locator templates keyed by operating system. Empty means unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    /// Linux locator
    #[serde(default)]
    pub linux: String,
    /// macOS locator
    #[serde(default)]
    pub darwin: String,
    /// Windows locator
    #[serde(default)]
    pub windows: String,
}

impl SourceTable {
    /// Template configured for `os`.
    #[must_use]
    pub fn get(&self, os: Os) -> &str {
        match os {
            Os::Linux => &self.linux,
            Os::Darwin => &self.darwin,
            Os::Windows => &self.windows,
        }
    }
}

/// Selection of archive members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractSpec {
    /// Regular expression matched against member names
    #[serde(default)]
    pub pattern: String,
    /// Member names kept verbatim
    #[serde(default)]
    pub list: Vec<String>,
}

impl ToolDescriptor {
    /// Create a descriptor with only a name and release set.
    #[must_use]
    pub fn new(name: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            release: release.into(),
            ..Self::default()
        }
    }

    /// Primary name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Whether `name` is the primary name or one of the aliases.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    /// Arguments for the version probe, defaulting to `version`.
    #[must_use]
    pub fn probe_args(&self) -> Vec<String> {
        if self.version_command.is_empty() {
            vec![DEFAULT_VERSION_ARG.to_string()]
        } else {
            self.version_command.clone()
        }
    }

    /// Executable file name on `platform`.
    #[must_use]
    pub fn exe_name(&self, platform: &Platform) -> String {
        format!("{}{}", self.name, platform.exe_suffix())
    }

    /// Members to extract from an archive: the configured list, or the bare executable.
    #[must_use]
    pub fn extract_members(&self, platform: &Platform) -> Vec<String> {
        if self.extract.list.is_empty() {
            vec![self.exe_name(platform)]
        } else {
            self.extract.list.clone()
        }
    }

    /// Source locator for `platform` with placeholders substituted.
    ///
    /// Returns `None` when no locator is configured for the platform's OS.
    #[must_use]
    pub fn source_for(&self, platform: &Platform) -> Option<SourceLocator> {
        let template = self.sources.get(platform.os).trim();
        if template.is_empty() {
            return None;
        }
        Some(SourceLocator::parse(&expand_template(
            template,
            &self.name,
            &self.release,
            platform,
        )))
    }

    /// Declared cache path, made absolute against `tool_dir` when relative.
    #[must_use]
    pub fn declared_cache_path(&self, tool_dir: &Path) -> Option<PathBuf> {
        let declared = self.cache_path.trim();
        if declared.is_empty() {
            return None;
        }
        let declared = Path::new(declared);
        Some(if declared.is_absolute() {
            declared.to_path_buf()
        } else {
            tool_dir.join(declared)
        })
    }
}

/// Substitute `{{name}}`, `{{release}}`, `{{os}}` and `{{arch}}` in a locator template.
#[must_use]
pub fn expand_template(template: &str, name: &str, release: &str, platform: &Platform) -> String {
    template
        .replace("{{name}}", name)
        .replace("{{release}}", release)
        .replace("{{os}}", platform.os.as_str())
        .replace("{{arch}}", platform.arch.as_str())
}

/// Where an artifact comes from, distinguished by URI scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// Remote artifact fetched over HTTP(S)
    Http(String),
    /// Local artifact (`file://` or a bare path)
    File(PathBuf),
    /// Any other scheme; rejected when a download is required
    Unsupported {
        /// Scheme as written
        scheme: String,
        /// Full locator
        locator: String,
    },
}

impl SourceLocator {
    /// Classify an already expanded locator.
    #[must_use]
    pub fn parse(locator: &str) -> Self {
        let Some((scheme, rest)) = locator.split_once("://") else {
            return Self::File(PathBuf::from(locator));
        };
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Self::Http(locator.to_string()),
            "file" => Self::File(PathBuf::from(rest)),
            _ => Self::Unsupported {
                scheme: scheme.to_string(),
                locator: locator.to_string(),
            },
        }
    }

    /// Last path segment of the locator, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Http(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/')
                    .next()
                    .filter(|segment| !segment.is_empty() && !segment.contains(':'))
                    .map(str::to_string)
            }
            Self::File(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Unsupported { .. } => None,
        }
    }

    /// Whether the artifact lives on the local filesystem.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl std::fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(url) => f.write_str(url),
            Self::File(path) => write!(f, "file://{}", path.display()),
            Self::Unsupported { locator, .. } => f.write_str(locator),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    String(String),
    List(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(StringOrList::List(list)) => list,
    })
}
