//! Host platform detection.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    Darwin,
    Windows,
}

impl HostOs {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Darwin,
            "windows" => Self::Windows,
            _ => Self::Linux,
        }
    }

    /// Name used in fragment file names (`<component>.<os>.yml`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OS, architecture and privilege level of the invoking process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: HostOs,
    pub arch: String,
    pub is_admin: bool,
}

impl Platform {
    pub fn detect() -> Self {
        Self {
            os: HostOs::current(),
            arch: normalize_arch(std::env::consts::ARCH).to_owned(),
            is_admin: current_euid() == Some(0),
        }
    }

    pub fn new(os: HostOs, arch: impl Into<String>, is_admin: bool) -> Self {
        Self {
            os,
            arch: arch.into(),
            is_admin,
        }
    }
}

fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Safe wrapper around libc::geteuid().
#[cfg(unix)]
#[allow(unsafe_code)]
fn current_euid() -> Option<u32> {
    // SAFETY: geteuid() takes no arguments, has no side effects and cannot fail.
    Some(unsafe { libc::geteuid() })
}

#[cfg(not(unix))]
fn current_euid() -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_uses_runtime_names() {
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }

    #[test]
    fn os_names_match_fragment_suffixes() {
        assert_eq!(HostOs::Darwin.as_str(), "darwin");
        assert_eq!(HostOs::Windows.to_string(), "windows");
    }

    #[test]
    fn detect_reports_current_os() {
        let p = Platform::detect();
        assert_eq!(p.os, HostOs::current());
        assert!(!p.arch.is_empty());
    }
}
