//! Error taxonomy for convergence runs.
//!
//! Errors come in two tiers:
//!
//! - [`ApplyError`] is per-resource. Providers return it, the engine turns it
//!   into a `Failed` outcome in the ledger, and the run carries on.
//! - [`PlanError`] and [`EngineError`] are run-level. They are raised before
//!   any provider is invoked (invalid plan) or when the ledger can no longer be
//!   persisted, and abort the run.

use crate::resource::ResourceKind;
use crate::types::CommandOutput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Category of a per-resource failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The referenced package, artifact or upstream entry does not exist
    NotFound,
    /// The operation needs privileges the run does not have
    PermissionDenied,
    /// A network request could not be completed
    NetworkUnavailable,
    /// The underlying system command exited non-zero
    ExternalToolFailed,
    /// The provider did not finish within the configured limit
    Timeout,
}

impl ErrorKind {
    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Not found",
            Self::PermissionDenied => "Permission denied",
            Self::NetworkUnavailable => "Network unavailable",
            Self::ExternalToolFailed => "External tool failed",
            Self::Timeout => "Timed out",
        }
    }

    /// Get actionable advice for resolving this error kind.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the identifier and that the required repository is enabled",
            Self::PermissionDenied => "Re-run with sudo available or as root",
            Self::NetworkUnavailable => "Check your internet connection and re-run",
            Self::ExternalToolFailed => "Inspect the captured tool output in the detail",
            Self::Timeout => "Raise the timeout or check for a held package-manager lock",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A provider failure: a kind plus the diagnostic detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ApplyError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApplyError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn permission_denied(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, detail)
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkUnavailable, detail)
    }

    pub fn tool_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalToolFailed, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    /// Build an `ExternalToolFailed` error from a finished command.
    ///
    /// The detail carries stderr, falling back to stdout when stderr is empty.
    pub fn from_output(tool: &str, output: &CommandOutput) -> Self {
        let stderr = output.stderr_str();
        let captured = if stderr.trim().is_empty() {
            output.stdout_str()
        } else {
            stderr
        };
        Self::tool_failed(format!("{tool} failed: {}", captured.trim()))
    }

    /// Map an IO error raised while doing `what`.
    pub fn from_io(what: &str, err: &io::Error) -> Self {
        let detail = format!("{what}: {err}");
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::permission_denied(detail),
            io::ErrorKind::TimedOut => Self::timeout(detail),
            _ => Self::tool_failed(detail),
        }
    }

    /// A spec handed to a provider of a different kind.
    pub fn unsupported(provider: ResourceKind, got: ResourceKind) -> Self {
        Self::tool_failed(format!("{provider} provider cannot handle a {got} resource"))
    }
}

/// Invalid plan. Always detected before any provider runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("resource id must not be empty")]
    EmptyId,

    #[error("duplicate resource id `{0}`")]
    DuplicateId(String),

    #[error("resource `{resource}` depends on unknown resource `{dependency}`")]
    UnknownDependency { resource: String, dependency: String },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("no provider registered for {kind} (needed by `{resource}`)")]
    MissingProvider { resource: String, kind: ResourceKind },
}

/// Run-level failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("failed to persist ledger: {0}")]
    Ledger(#[from] io::Error),

    #[error("failed to create worker pool: {0}")]
    Pool(String),
}

impl EngineError {
    /// Whether the run was rejected before touching the system.
    pub fn is_pre_run(&self) -> bool {
        matches!(self, Self::Plan(_) | Self::Pool(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_output_prefers_stderr() {
        let output = CommandOutput {
            stdout: b"ignored".to_vec(),
            stderr: b"Error: Unable to find a match: nope\n".to_vec(),
            success: false,
        };
        let err = ApplyError::from_output("dnf", &output);
        assert_eq!(err.kind, ErrorKind::ExternalToolFailed);
        assert_eq!(err.detail, "dnf failed: Error: Unable to find a match: nope");
    }

    #[test]
    fn test_from_output_falls_back_to_stdout() {
        let output = CommandOutput {
            stdout: b"something went wrong".to_vec(),
            stderr: Vec::new(),
            success: false,
        };
        let err = ApplyError::from_output("gsettings", &output);
        assert!(err.detail.ends_with("something went wrong"));
    }

    #[test]
    fn test_from_io_permission() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = ApplyError::from_io("write /etc/yum.repos.d/x.repo", &io_err);
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert!(err.detail.contains("/etc/yum.repos.d/x.repo"));
    }

    #[test]
    fn test_from_io_other() {
        let io_err = io::Error::other("boom");
        assert_eq!(
            ApplyError::from_io("rename", &io_err).kind,
            ErrorKind::ExternalToolFailed
        );
    }

    #[test]
    fn test_cycle_display() {
        let err = PlanError::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_error_kind_advice() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::NetworkUnavailable,
            ErrorKind::ExternalToolFailed,
            ErrorKind::Timeout,
        ] {
            assert!(!kind.description().is_empty());
            assert!(!kind.advice().is_empty());
        }
    }
}
