//! Core types for extension management.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Running GNOME Shell version; the index is keyed by major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellVersion {
    pub major: u32,
    pub minor: Option<u32>,
}

impl ShellVersion {
    pub fn new(major: u32) -> Self {
        Self { major, minor: None }
    }

    /// Parse `gnome-shell --version` output ("GNOME Shell 46.2")
    pub fn parse(output: &str) -> Option<Self> {
        let version = output.split_whitespace().last()?;
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|m| m.parse().ok());
        Some(Self { major, minor })
    }

    /// Value for the index's `shell_version` parameter
    pub fn query_value(&self) -> String {
        self.major.to_string()
    }
}

impl fmt::Display for ShellVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{minor}", self.major),
            None => write!(f, "{}", self.major),
        }
    }
}

/// A search hit from the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionEntry {
    pub uuid: String,
    pub name: String,
    /// Numeric id used by the release endpoint
    pub pk: u64,
}

/// A release of an extension compatible with a shell version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRelease {
    pub uuid: String,
    pub pk: u64,
    pub version: Option<u32>,
    /// Absolute archive URL
    pub download_url: String,
}

/// Locally observed state of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionState {
    pub uuid: String,
    pub enabled: bool,
    /// Raw state string reported by the shell ("ACTIVE", "INITIALIZED")
    pub state: Option<String>,
}

impl ExtensionState {
    /// Parse `gnome-extensions info` output.
    ///
    /// GNOME 45+ prints `Enabled: Yes` alongside `State:`; older releases
    /// only print `State: ENABLED`.
    pub fn parse(uuid: &str, output: &str) -> Self {
        let mut enabled = None;
        let mut state = None;
        for line in output.lines() {
            let Some((key, value)) = line.trim().split_once(':') else {
                continue;
            };
            match key.trim() {
                "Enabled" => enabled = Some(value.trim().eq_ignore_ascii_case("yes")),
                "State" => state = Some(value.trim().to_string()),
                _ => {}
            }
        }
        let enabled = enabled.unwrap_or_else(|| {
            state
                .as_deref()
                .is_some_and(|s| matches!(s, "ENABLED" | "ACTIVE"))
        });
        Self {
            uuid: uuid.to_string(),
            enabled,
            state,
        }
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub uuid: String,
    pub pk: u64,
    pub version: Option<u32>,
    pub shell_version: ShellVersion,
    pub enabled: bool,
}
