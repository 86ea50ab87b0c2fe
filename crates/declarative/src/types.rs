//! Core types for declarative resource management

use crate::error::{ApplyError, ErrorKind};
use crate::resource::{Resource, ResourceKind, ResourceSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;
use std::time::Duration;

/// Observed state of a resource, as reported by a provider query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// The system already matches the desired state
    Satisfied,
    /// The system differs from the desired state
    Unsatisfied,
    /// State cannot be determined (tool unreachable, no session)
    Unknown,
}

impl QueryState {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied => write!(f, "satisfied"),
            Self::Unsatisfied => write!(f, "unsatisfied"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Final status of one resource in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    AlreadySatisfied,
    Applied,
    Failed,
    Skipped,
}

impl OutcomeStatus {
    /// Whether the resource ended up in its desired state
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadySatisfied | Self::Applied)
    }

    /// Dependents of a resource with this status must not run
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySatisfied => write!(f, "already satisfied"),
            Self::Applied => write!(f, "applied"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a resource was not attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A prerequisite failed or was itself skipped
    Dependency { id: String, status: OutcomeStatus },
    /// The run was cancelled before this resource started
    Cancelled,
    /// Dry run: the resource would have been applied
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependency { id, status } => write!(f, "dependency `{id}` {status}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::DryRun => write!(f, "dry run"),
        }
    }
}

/// One provider attempt made while converging a resource with fallbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub kind: ResourceKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Attempt {
    pub fn succeeded(spec: &ResourceSpec) -> Self {
        Self {
            kind: spec.kind(),
            target: spec.target(),
            error: None,
            detail: None,
        }
    }

    pub fn failed(spec: &ResourceSpec, err: &ApplyError) -> Self {
        Self {
            kind: spec.kind(),
            target: spec.target(),
            error: Some(err.kind),
            detail: Some(err.detail.clone()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The recorded result for one resource in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
    pub timestamp: DateTime<Utc>,
}

impl Outcome {
    fn base(resource: &Resource, status: OutcomeStatus) -> Self {
        Self {
            resource_id: resource.id.clone(),
            kind: resource.kind(),
            status,
            error: None,
            skip: None,
            detail: None,
            attempts: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn already_satisfied(resource: &Resource, detail: Option<String>) -> Self {
        Self {
            detail,
            ..Self::base(resource, OutcomeStatus::AlreadySatisfied)
        }
    }

    pub fn applied(resource: &Resource, detail: Option<String>, attempts: Vec<Attempt>) -> Self {
        Self {
            detail,
            attempts,
            ..Self::base(resource, OutcomeStatus::Applied)
        }
    }

    pub fn failed(resource: &Resource, err: &ApplyError, attempts: Vec<Attempt>) -> Self {
        Self {
            error: Some(err.kind),
            detail: Some(err.detail.clone()),
            attempts,
            ..Self::base(resource, OutcomeStatus::Failed)
        }
    }

    pub fn skipped(resource: &Resource, reason: SkipReason) -> Self {
        Self {
            detail: Some(reason.to_string()),
            skip: Some(reason),
            ..Self::base(resource, OutcomeStatus::Skipped)
        }
    }
}

/// A failed resource, as listed in the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub resource_id: String,
    pub error: Option<ErrorKind>,
    pub detail: Option<String>,
}

/// Overall reading of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every resource was already satisfied
    NothingToDo,
    /// Changes were made and nothing failed
    Converged { applied: usize },
    /// At least one resource failed
    ConvergedWithFailures { applied: usize, failed: usize },
    /// Dry run: this many resources would have been applied
    DryRun { pending: usize },
    /// The run was interrupted
    Cancelled { remaining: usize },
}

/// Summary of one run, derived from its ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub already_satisfied: usize,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureReport>,
}

impl RunSummary {
    pub fn from_outcomes<'a>(
        outcomes: impl IntoIterator<Item = &'a Outcome>,
        cancelled: bool,
        dry_run: bool,
    ) -> Self {
        let mut summary = Self {
            cancelled,
            dry_run,
            ..Self::default()
        };
        for outcome in outcomes {
            summary.add_outcome(outcome);
        }
        summary
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome.status {
            OutcomeStatus::AlreadySatisfied => self.already_satisfied += 1,
            OutcomeStatus::Applied => self.applied += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => {
                self.failed += 1;
                self.failures.push(FailureReport {
                    resource_id: outcome.resource_id.clone(),
                    error: outcome.error,
                    detail: outcome.detail.clone(),
                });
            }
        }
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.already_satisfied + self.applied + self.failed + self.skipped
    }

    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    pub fn verdict(&self) -> Verdict {
        if self.cancelled {
            Verdict::Cancelled {
                remaining: self.skipped,
            }
        } else if self.failed > 0 {
            Verdict::ConvergedWithFailures {
                applied: self.applied,
                failed: self.failed,
            }
        } else if self.dry_run && self.skipped > 0 {
            Verdict::DryRun {
                pending: self.skipped,
            }
        } else if self.applied == 0 && self.skipped == 0 {
            Verdict::NothingToDo
        } else {
            Verdict::Converged {
                applied: self.applied,
            }
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Query only; record unsatisfied resources as skipped
    pub dry_run: bool,
    /// Worker count for independent resources; 1 runs sequentially
    pub jobs: usize,
    /// Upper bound for a single query or apply
    pub timeout: Option<Duration>,
    /// Verbose output
    pub verbose: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 1,
            timeout: None,
            verbose: false,
        }
    }
}

/// Output from a command run on behalf of a provider
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{GSettingSpec, ResourceSpec};

    fn resource(id: &str) -> Resource {
        Resource::new(
            id,
            ResourceSpec::GSetting(GSettingSpec {
                schema: "org.gnome.desktop.interface".into(),
                key: "clock-show-weekday".into(),
                value: "true".into(),
            }),
        )
    }

    #[test]
    fn test_verdict_nothing_to_do() {
        let outcomes = vec![
            Outcome::already_satisfied(&resource("a"), None),
            Outcome::already_satisfied(&resource("b"), None),
        ];
        let summary = RunSummary::from_outcomes(&outcomes, false, false);
        assert_eq!(summary.verdict(), Verdict::NothingToDo);
        assert!(summary.is_success());
    }

    #[test]
    fn test_verdict_with_failures() {
        let err = ApplyError::not_found("no such package");
        let outcomes = vec![
            Outcome::applied(&resource("a"), None, Vec::new()),
            Outcome::failed(&resource("b"), &err, Vec::new()),
            Outcome::skipped(
                &resource("c"),
                SkipReason::Dependency {
                    id: "b".into(),
                    status: OutcomeStatus::Failed,
                },
            ),
        ];
        let summary = RunSummary::from_outcomes(&outcomes, false, false);
        assert_eq!(
            summary.verdict(),
            Verdict::ConvergedWithFailures {
                applied: 1,
                failed: 1
            }
        );
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].error, Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_verdict_dry_run_and_cancelled() {
        let outcomes = vec![Outcome::skipped(&resource("a"), SkipReason::DryRun)];
        let summary = RunSummary::from_outcomes(&outcomes, false, true);
        assert_eq!(summary.verdict(), Verdict::DryRun { pending: 1 });

        let outcomes = vec![Outcome::skipped(&resource("a"), SkipReason::Cancelled)];
        let summary = RunSummary::from_outcomes(&outcomes, true, false);
        assert_eq!(summary.verdict(), Verdict::Cancelled { remaining: 1 });
        assert!(!summary.is_success());
    }

    #[test]
    fn test_skip_reason_detail() {
        let outcome = Outcome::skipped(
            &resource("pkg"),
            SkipReason::Dependency {
                id: "repo".into(),
                status: OutcomeStatus::Failed,
            },
        );
        assert_eq!(outcome.detail.as_deref(), Some("dependency `repo` failed"));
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
    }

    #[test]
    fn test_outcome_serializes_without_empty_fields() {
        let outcome = Outcome::applied(&resource("a"), None, Vec::new());
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"applied\""));
        assert!(!json.contains("attempts"));
        assert!(!json.contains("error"));
    }
}
