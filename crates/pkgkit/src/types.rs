//! Core types for package operations.

use std::fmt;

/// An RPM package or comps group to install with dnf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmPackage {
    pub name: String,
    /// `dnf group install` instead of `dnf install`
    pub group: bool,
    /// Let dnf replace conflicting packages
    pub allow_erasing: bool,
    /// Only consider this repository
    pub repo: Option<String>,
}

impl RpmPackage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: false,
            allow_erasing: false,
            repo: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: true,
            ..Self::new(name)
        }
    }

    pub fn allow_erasing(mut self) -> Self {
        self.allow_erasing = true;
        self
    }

    pub fn from_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }
}

impl fmt::Display for RpmPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group {
            write!(f, "@{}", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Flatpak installation a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Installation {
    #[default]
    System,
    User,
}

impl Installation {
    pub fn flag(&self) -> &'static str {
        match self {
            Self::System => "--system",
            Self::User => "--user",
        }
    }

    /// System installations are modified as root
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::System)
    }
}

/// A Flatpak remote definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    /// `.flatpakrepo` URL used by `remote-add`
    pub url: String,
}

impl Remote {
    pub fn flathub() -> Self {
        Self {
            name: "flathub".to_string(),
            url: "https://dl.flathub.org/repo/flathub.flatpakrepo".to_string(),
        }
    }
}

/// A Flatpak application reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatpakApp {
    pub app_id: String,
    pub remote: String,
    pub installation: Installation,
}

impl FlatpakApp {
    pub fn new(app_id: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            remote: remote.into(),
            installation: Installation::System,
        }
    }

    pub fn user(mut self) -> Self {
        self.installation = Installation::User;
        self
    }
}

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

impl From<std::process::Output> for RunOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}
