//! Configuration documents.
//!
//! The catalog and engine settings come from one or more YAML documents
//! merged in order. Later documents override scalar settings and replace the
//! utility list when they declare one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::ToolCatalog;
use crate::descriptor::ToolDescriptor;
use crate::layout::CacheLayout;
use crate::{Error, Result};

/// File names probed when a configuration location is a directory.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["kubestrap.yaml", "kubestrap.yml"];

/// Timeout applied to raw commands when none is configured.
pub const DEFAULT_RAW_TIMEOUT: Duration = Duration::from_secs(60);

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Root of the provisioning cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<PathBuf>,

    /// Settings of the `raw` command and the tool catalog
    #[serde(default)]
    pub raw: RawConfig,
}

/// Settings for running catalog tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    /// Execution timeout such as `1m` or `90s`; `0` disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Tool catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilities: Option<Vec<ToolDescriptor>>,
}

impl Config {
    /// Decode one YAML document. `origin` is only used in error messages.
    pub fn from_yaml_str(contents: &str, origin: Option<&Path>) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| Error::invalid_config(origin, e.to_string()))
    }

    /// Read and decode one YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read config"))?;
        Self::from_yaml_str(&contents, Some(path))
    }

    /// Load and merge every document found at `locations`.
    ///
    /// A location is either a file or a directory probed for
    /// [`CONFIG_FILE_NAMES`]. Missing locations are skipped.
    pub fn load(locations: &[PathBuf]) -> Result<Self> {
        let mut merged = Self::default();
        for location in locations {
            for file in Self::candidates(location) {
                tracing::debug!(path = %file.display(), "Loading configuration");
                merged.merge(Self::from_file(&file)?);
            }
        }
        Ok(merged)
    }

    fn candidates(location: &Path) -> Vec<PathBuf> {
        if location.is_file() {
            return vec![location.to_path_buf()];
        }
        if location.is_dir() {
            return CONFIG_FILE_NAMES
                .iter()
                .map(|name| location.join(name))
                .filter(|p| p.is_file())
                .take(1)
                .collect();
        }
        tracing::trace!(path = %location.display(), "Configuration location not found");
        Vec::new()
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: Self) {
        if other.cache_root.is_some() {
            self.cache_root = other.cache_root;
        }
        if other.raw.timeout.is_some() {
            self.raw.timeout = other.raw.timeout;
        }
        if other.raw.utilities.is_some() {
            self.raw.utilities = other.raw.utilities;
        }
    }

    /// Tool catalog in declaration order.
    pub fn catalog(&self) -> Result<ToolCatalog> {
        let catalog: ToolCatalog = self.raw.utilities.iter().flatten().cloned().collect();
        catalog.validate()?;
        Ok(catalog)
    }

    /// Cache layout, falling back to the user cache directory.
    #[must_use]
    pub fn layout(&self) -> CacheLayout {
        self.cache_root
            .as_ref()
            .map_or_else(CacheLayout::default, CacheLayout::new)
    }

    /// Raw command timeout.
    pub fn raw_timeout(&self) -> Result<Duration> {
        self.raw
            .timeout
            .as_deref()
            .map_or(Ok(DEFAULT_RAW_TIMEOUT), parse_duration)
    }
}

/// Parse durations like `0`, `90`, `500ms`, `45s`, `1m30s` or `2h`.
///
/// A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || Error::InvalidDuration {
        value: input.to_string(),
    };
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos: f64 = match &rest[..unit_len] {
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        let nanos = (value * unit_nanos).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(invalid());
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = nanos as u64;
        total = total.checked_add(Duration::from_nanos(nanos)).ok_or_else(invalid)?;
    }
    Ok(total)
}
