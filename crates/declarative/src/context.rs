//! Provider trait, apply context and run-scoped collaborators
//!
//! These traits allow the declarative crate to be used without
//! depending on specific implementations of sudo, progress, etc.

use crate::error::{ApplyError, PlanError};
use crate::planner::ExecutionPlan;
use crate::resource::{ResourceKind, ResourceSpec};
use crate::types::{CommandOutput, Outcome, QueryState, RunSummary};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Adapter between one resource kind and the external subsystem behind it
///
/// `query` must not change the system. `apply` must be safe to call when the
/// resource is already satisfied: a redundant apply is harmless, never
/// destructive.
pub trait Provider: Send + Sync {
    /// The resource kind this provider handles
    fn kind(&self) -> ResourceKind;

    /// Inspect current state
    ///
    /// Return [`QueryState::Unknown`] when state cannot be determined; the
    /// engine then attempts `apply`.
    fn query(&self, spec: &ResourceSpec) -> QueryState;

    /// Converge the system to the desired state
    fn apply(&self, spec: &ResourceSpec, ctx: &ApplyContext) -> Result<(), ApplyError>;

    /// Whether applying this spec needs elevated privileges
    fn requires_privilege(&self, _spec: &ResourceSpec) -> bool {
        false
    }
}

/// Provider for elevated privilege operations
///
/// Implement this trait to provide sudo/admin capabilities.
/// The implementation handles privilege acquisition and release.
pub trait SudoProvider: Send + Sync {
    /// Run a command with elevated privileges
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        Ok(self.run(cmd, args)?.success)
    }

    /// Run a command and capture stdout
    fn run_capture(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.run(cmd, args)?;
        if !output.success {
            anyhow::bail!("Command failed: {}", output.stderr_str().trim());
        }
        Ok(output.stdout_str())
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
/// In layered (parallel) runs `on_resource_start` is not called; outcomes
/// are reported once the layer has joined.
pub trait ProgressCallback: Send {
    /// Called once the plan has been validated and ordered
    fn on_run_start(&mut self, total: usize);

    /// Called before a layer of independent resources is dispatched
    fn on_layer_start(&mut self, index: usize, size: usize);

    /// Called when starting to converge a single resource
    ///
    /// Layered runs call it for every resource of a layer before the layer
    /// is dispatched. Skipped resources never start.
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called after an outcome has been recorded in the ledger
    fn on_outcome(&mut self, outcome: &Outcome);

    /// Called after the summary has been persisted
    fn on_run_complete(&mut self, summary: &RunSummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_layer_start(&mut self, _index: usize, _size: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_outcome(&mut self, _outcome: &Outcome) {}
    fn on_run_complete(&mut self, _summary: &RunSummary) {}
}

/// Run-scoped cancellation signal
///
/// Checked between resources. In-flight applies always finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Shared flag, for wiring into signal handlers
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Context passed to provider apply operations
#[derive(Clone, Default)]
pub struct ApplyContext {
    /// Whether to output verbose information
    pub verbose: bool,
    /// Optional sudo provider for privileged operations
    pub sudo: Option<Arc<dyn SudoProvider>>,
}

impl ApplyContext {
    /// Create a new apply context
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            sudo: None,
        }
    }

    /// Create a context with a sudo provider
    pub fn with_sudo(verbose: bool, sudo: Arc<dyn SudoProvider>) -> Self {
        Self {
            verbose,
            sudo: Some(sudo),
        }
    }

    /// Get the sudo provider, or a permission error if not available
    pub fn require_sudo(&self) -> Result<&dyn SudoProvider, ApplyError> {
        self.sudo
            .as_deref()
            .ok_or_else(|| ApplyError::permission_denied("sudo required but not available"))
    }

    /// Run a command through sudo, mapping spawn failures to apply errors
    pub fn run_privileged(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput, ApplyError> {
        self.require_sudo()?
            .run(cmd, args)
            .map_err(|e| ApplyError::permission_denied(format!("sudo {cmd}: {e:#}")))
    }
}

/// Maps each resource kind to its provider
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ResourceKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for the same kind
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).cloned()
    }

    /// Ensure every spec in the plan, fallbacks included, has a provider
    pub fn check(&self, plan: &ExecutionPlan) -> Result<(), PlanError> {
        for resource in plan.resources() {
            for spec in resource.specs() {
                if !self.providers.contains_key(&spec.kind()) {
                    return Err(PlanError::MissingProvider {
                        resource: resource.id.clone(),
                        kind: spec.kind(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether any resource in the plan needs elevated privileges
    pub fn requires_privilege(&self, plan: &ExecutionPlan) -> bool {
        plan.resources().iter().any(|resource| {
            resource.specs().any(|spec| {
                self.providers
                    .get(&spec.kind())
                    .is_some_and(|p| p.requires_privilege(spec))
            })
        })
    }
}
