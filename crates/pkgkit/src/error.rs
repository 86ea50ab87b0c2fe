//! Error types for dnf and Flatpak operations.
//!
//! Failures are classified from the tool's stderr so callers can tell a
//! missing package from a network outage without parsing text themselves.

use thiserror::Error;

/// Categories of package-manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Mirror, metadata or download failure
    Network,
    /// Package, group, app or remote does not exist
    NotFound,
    /// Dependency resolution conflict
    Conflict,
    /// Needs root or a sudo session
    Permission,
    /// Nothing to do, the target is already present
    AlreadyInstalled,
    /// The tool itself is not installed
    ToolNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Whether this error can be safely ignored (operation already done).
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::AlreadyInstalled)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Package not found",
            Self::Conflict => "Package conflict",
            Self::Permission => "Permission denied",
            Self::AlreadyInstalled => "Already installed",
            Self::ToolNotFound => "Package manager not installed",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur during package operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("not found: {name}")]
    NotFound { name: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("permission denied: {message}")]
    Permission { message: String },

    #[error("already installed: {name}")]
    AlreadyInstalled { name: String },

    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    /// Command exited non-zero for an unrecognised reason
    #[error("{message}")]
    CommandFailed { message: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::AlreadyInstalled { .. } => ErrorCategory::AlreadyInstalled,
            Error::ToolNotFound(_) => ErrorCategory::ToolNotFound,
            Error::CommandFailed { .. } | Error::Io(_) => ErrorCategory::Other,
        }
    }

    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Captured diagnostic output, when the error came from a command
    pub fn diagnostic(&self) -> String {
        match self {
            Error::CommandFailed { message, stderr } if !stderr.is_empty() => {
                format!("{message}: {stderr}")
            }
            other => other.to_string(),
        }
    }

    /// Spawn failure for `tool`
    pub fn from_spawn(tool: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::ToolNotFound(tool.to_string()),
            std::io::ErrorKind::PermissionDenied => Error::Permission {
                message: format!("{tool}: {err}"),
            },
            _ => Error::Io(err),
        }
    }

    /// Classify a failed dnf or rpm invocation.
    pub fn from_dnf_output(stderr: &str, package_name: Option<&str>) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains("curl error")
            || lower.contains("cannot download")
            || lower.contains("failed to download")
            || lower.contains("could not resolve host")
            || lower.contains("timeout was reached")
            || lower.contains("network is unreachable")
            || lower.contains("failed to load expired repos cache")
            || lower.contains("cannot prepare internal mirrorlist")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        if lower.contains("no match for argument")
            || lower.contains("unable to find a match")
            || lower.contains("no groups matched")
            || lower.contains("no match for group")
            || lower.contains("no package")
        {
            return Error::NotFound {
                name: package_name.unwrap_or("unknown").to_string(),
            };
        }

        if lower.contains("has to be run with superuser privileges")
            || lower.contains("permission denied")
            || lower.contains("a password is required")
            || lower.contains("operation not permitted")
        {
            return Error::Permission {
                message: stderr.trim().to_string(),
            };
        }

        if lower.contains("conflicting requests")
            || lower.contains("conflicts with")
            || lower.contains("--allowerasing")
        {
            return Error::Conflict {
                message: stderr.trim().to_string(),
            };
        }

        if lower.contains("is already installed") {
            return Error::AlreadyInstalled {
                name: package_name.unwrap_or("unknown").to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "dnf failed{}",
                package_name.map(|n| format!(" for {n}")).unwrap_or_default()
            ),
            stderr: stderr.trim().to_string(),
        }
    }

    /// Classify a failed flatpak invocation.
    pub fn from_flatpak_output(stderr: &str, app_id: Option<&str>) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains("can't fetch summary")
            || lower.contains("unable to load summary")
            || lower.contains("could not resolve")
            || lower.contains("unable to connect")
            || lower.contains("while fetching")
            || lower.contains("timeout was reached")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        if lower.contains("nothing matches")
            || lower.contains("no remote refs found")
            || lower.contains("no remote")
            || lower.contains("not found")
        {
            return Error::NotFound {
                name: app_id.unwrap_or("unknown").to_string(),
            };
        }

        if lower.contains("already installed") {
            return Error::AlreadyInstalled {
                name: app_id.unwrap_or("unknown").to_string(),
            };
        }

        if lower.contains("permission denied") || lower.contains("not allowed") {
            return Error::Permission {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "flatpak failed{}",
                app_id.map(|n| format!(" for {n}")).unwrap_or_default()
            ),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dnf_not_found() {
        let err = Error::from_dnf_output(
            "No match for argument: steamm\nError: Unable to find a match: steamm",
            Some("steamm"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.to_string(), "not found: steamm");
    }

    #[test]
    fn test_dnf5_not_found() {
        let err = Error::from_dnf_output(
            "Failed to resolve the transaction:\nNo match for argument: nope",
            Some("nope"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_dnf_network() {
        let err = Error::from_dnf_output(
            "Curl error (6): Couldn't resolve host name for https://mirrors.fedoraproject.org",
            Some("vlc"),
        );
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.category().is_transient());
    }

    #[test]
    fn test_dnf_permission() {
        let err = Error::from_dnf_output(
            "Error: This command has to be run with superuser privileges (under the root user on most systems).",
            Some("vlc"),
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_dnf_conflict() {
        let err = Error::from_dnf_output(
            "Problem: problem with installed package ffmpeg-free\n  - package ffmpeg conflicts with ffmpeg-free\n(try to add '--allowerasing' to command line)",
            Some("ffmpeg"),
        );
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_dnf_unrecognised_keeps_stderr() {
        let err = Error::from_dnf_output("Error: rpmdb open failed", Some("vlc"));
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.diagnostic(), "dnf failed for vlc: Error: rpmdb open failed");
    }

    #[test]
    fn test_flatpak_classification() {
        let err = Error::from_flatpak_output(
            "error: Nothing matches com.example.Missing in remote flathub",
            Some("com.example.Missing"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let err = Error::from_flatpak_output(
            "error: Unable to load summary from remote flathub: Could not resolve hostname",
            Some("org.gimp.GIMP"),
        );
        assert_eq!(err.category(), ErrorCategory::Network);

        let err = Error::from_flatpak_output(
            "warning: org.gimp.GIMP is already installed",
            Some("org.gimp.GIMP"),
        );
        assert!(err.is_ignorable());
    }

    #[test]
    fn test_from_spawn() {
        let err = Error::from_spawn(
            "flatpak",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        );
        assert_eq!(err.category(), ErrorCategory::ToolNotFound);
        assert_eq!(err.to_string(), "flatpak not found in PATH");
    }
}
