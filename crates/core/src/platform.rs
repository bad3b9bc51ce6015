//! Host platform detection.
//!
//! Descriptors pick their download locator by operating system and may
//! reference the CPU architecture inside the locator template, so both are
//! modelled as small closed enums.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Platform identifier combining OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system
    pub os: Os,
    /// CPU architecture
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the platform this process runs on.
    pub fn detect() -> Result<Self> {
        let os = Os::parse(std::env::consts::OS).ok_or_else(|| Error::UnsupportedPlatform {
            os: std::env::consts::OS.to_string(),
        })?;
        let arch =
            Arch::parse(std::env::consts::ARCH).ok_or_else(|| Error::UnsupportedPlatform {
                os: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            })?;
        Ok(Self { os, arch })
    }

    /// Parse from string like "linux-amd64".
    pub fn parse(s: &str) -> Option<Self> {
        let (os, arch) = s.split_once('-')?;
        Some(Self {
            os: Os::parse(os)?,
            arch: Arch::parse(arch)?,
        })
    }

    /// File name suffix executables carry on this platform.
    #[must_use]
    pub fn exe_suffix(&self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::Darwin => "",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Linux
    Linux,
    /// macOS
    Darwin,
    /// Windows
    Windows,
}

impl Os {
    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "darwin" | "macos" => Some(Self::Darwin),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    /// Key used for this OS in descriptor locator tables.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit x86
    #[serde(rename = "amd64")]
    X86_64,
    /// 64-bit ARM
    Arm64,
}

impl Arch {
    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Some(Self::Arm64),
            "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
            _ => None,
        }
    }

    /// Name substituted for `{{arch}}` in locator templates.
    ///
    /// Release artifacts of Kubernetes tooling are published under the
    /// `amd64`/`arm64` naming, not the Rust target names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_parse() {
        assert_eq!(Os::parse("linux"), Some(Os::Linux));
        assert_eq!(Os::parse("macos"), Some(Os::Darwin));
        assert_eq!(Os::parse("Windows"), Some(Os::Windows));
        assert_eq!(Os::parse("plan9"), None);
    }

    #[test]
    fn test_arch_names_for_templates() {
        assert_eq!(Arch::parse("x86_64"), Some(Arch::X86_64));
        assert_eq!(Arch::parse("aarch64"), Some(Arch::Arm64));
        assert_eq!(Arch::X86_64.to_string(), "amd64");
        assert_eq!(Arch::Arm64.to_string(), "arm64");
    }

    #[test]
    fn test_platform_parse_and_display() {
        let platform = Platform::parse("darwin-arm64");
        assert_eq!(platform, Some(Platform::new(Os::Darwin, Arch::Arm64)));
        assert_eq!(
            Platform::new(Os::Linux, Arch::X86_64).to_string(),
            "linux-amd64"
        );
        assert!(Platform::parse("linux").is_none());
    }

    #[test]
    fn test_exe_suffix() {
        assert_eq!(Platform::new(Os::Windows, Arch::X86_64).exe_suffix(), ".exe");
        assert_eq!(Platform::new(Os::Linux, Arch::Arm64).exe_suffix(), "");
    }

    #[test]
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    fn test_detect_on_linux_amd64() {
        let platform = Platform::detect();
        assert!(matches!(
            platform,
            Ok(Platform {
                os: Os::Linux,
                arch: Arch::X86_64
            })
        ));
    }
}
