//! Error types for extension resolution and installation.
//!
//! Every error that happens inside the install pipeline names the [`Step`]
//! it came from, so a failed run says whether the lookup, the release
//! resolution, the download or the install went wrong.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for extension operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of the install pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Search the index for the extension's numeric id
    Lookup,
    /// Ask the index for a release matching the shell version
    Resolve,
    /// Fetch the release archive
    Download,
    /// Hand the archive to gnome-extensions and enable it
    Install,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lookup => "lookup",
            Self::Resolve => "resolve",
            Self::Download => "download",
            Self::Install => "install",
        })
    }
}

/// Categories of extension errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport failure talking to the index
    Network,
    /// The index had no usable data for this extension
    NotFound,
    /// Malformed response or archive
    Format,
    /// Filesystem permission problem
    Permission,
    /// gnome-extensions or gnome-shell failed or is missing
    Tool,
    Other,
}

impl ErrorCategory {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Extension not found",
            Self::Format => "Invalid response or archive",
            Self::Permission => "Permission denied",
            Self::Tool => "GNOME Shell tooling failed",
            Self::Other => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while resolving or installing an extension.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{step}: {message}")]
    NotFound { step: Step, message: String },

    #[error("{step}: HTTP request failed: {message}")]
    Http {
        step: Step,
        message: String,
        status: Option<u16>,
    },

    #[error("{step}: invalid response: {message}")]
    InvalidResponse { step: Step, message: String },

    #[error("archive is for {found}, expected {expected}")]
    UuidMismatch { expected: String, found: String },

    #[error("invalid archive: {0}")]
    Archive(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },
}

impl Error {
    pub fn not_found(step: Step, message: impl Into<String>) -> Self {
        Self::NotFound {
            step,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Convert a ureq failure at `step`; a 404 means the index has no entry
    pub fn from_http(step: Step, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(404) => {
                Self::not_found(step, "extensions.gnome.org returned 404")
            }
            ureq::Error::StatusCode(code) => Self::Http {
                step,
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            ureq::Error::Json(e) => Self::InvalidResponse {
                step,
                message: e.to_string(),
            },
            other => Self::Http {
                step,
                message: other.to_string(),
                status: None,
            },
        }
    }

    /// Spawn failure for `tool`
    pub fn from_spawn(tool: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::ToolNotFound(tool.to_string())
        } else {
            Self::ToolFailed {
                tool: tool.to_string(),
                stderr: err.to_string(),
            }
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } | Error::UuidMismatch { .. } => ErrorCategory::NotFound,
            Error::Http { .. } => ErrorCategory::Network,
            Error::InvalidResponse { .. } | Error::Archive(_) => ErrorCategory::Format,
            Error::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
                ErrorCategory::Permission
            }
            Error::Io { .. } => ErrorCategory::Other,
            Error::ToolNotFound(_) | Error::ToolFailed { .. } => ErrorCategory::Tool,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_step() {
        let err = Error::not_found(Step::Lookup, "no extension matching dash-to-dock");
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.to_string(), "lookup: no extension matching dash-to-dock");
    }

    #[test]
    fn test_http_404_is_not_found() {
        let err = Error::from_http(Step::Resolve, ureq::Error::StatusCode(404));
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.to_string().starts_with("resolve:"));
    }

    #[test]
    fn test_http_5xx_is_network() {
        let err = Error::from_http(Step::Download, ureq::Error::StatusCode(503));
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_io_permission_category() {
        let err = Error::io(
            "/var/cache/choro",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_spawn_missing_tool() {
        let err = Error::from_spawn(
            "gnome-extensions",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.category(), ErrorCategory::Tool);
        assert_eq!(err.to_string(), "gnome-extensions not found in PATH");
    }
}
