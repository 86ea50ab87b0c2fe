//! # Declarative
//!
//! Dependency-ordered convergence of declared system state.
//!
//! A plan is a list of [`Resource`]s. Each one names a kind, the desired
//! state for that kind, the resources it depends on and optional fallbacks.
//! The [`Engine`] walks the plan in topological order, asks the registered
//! [`Provider`] whether the resource is already satisfied, applies it when it
//! is not, and appends exactly one [`Outcome`] per resource to the run's
//! [`Ledger`].
//!
//! ## Core Concepts
//!
//! - **Resource**: pure data describing desired state (package, file, setting)
//! - **Provider**: the query/apply adapter for one resource kind
//! - **ExecutionPlan**: a validated plan with a stable topological order
//! - **Engine**: converges a plan, isolating failures to their dependents
//! - **Ledger**: append-only outcomes of one run, persisted via [`LedgerStore`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     Engine, ExecuteOptions, ExecutionPlan, MemoryStore, NoProgress,
//!     ProviderRegistry, Resource,
//! };
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(Arc::new(DnfProvider::default()));
//!
//! let plan = ExecutionPlan::new(resources)?;
//! let engine = Engine::new(registry, ExecuteOptions::default());
//! let report = engine.run(&plan, &mut MemoryStore::new(), &mut NoProgress)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`Provider`]: query/apply for one resource kind
//! - [`SudoProvider`]: elevated command execution
//! - [`ProgressCallback`]: receives progress updates
//! - [`LedgerStore`]: durable ledger persistence
//!
//! This keeps the crate free of UI, sudo and storage implementations.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, CancelToken, NoProgress, ProgressCallback, Provider, ProviderRegistry,
    SudoProvider,
};
pub use diff::{ResourceStatus, StatusSummary, group_by_kind, inspect};
pub use error::{ApplyError, EngineError, ErrorKind, PlanError};
pub use executor::{Engine, RunReport, execute_simple};
pub use ledger::{Ledger, LedgerRecord, LedgerStore, MemoryStore, RunHeader};
pub use planner::{ExecutionPlan, parse_target};
pub use resource::{
    DownloadSpec, FlatpakAppSpec, FlatpakScope, GSettingSpec, GitCheckoutSpec, PackageSpec,
    RepoFileSpec, Resource, ResourceKind, ResourceSpec, ShellExtensionSpec,
};
pub use types::{
    Attempt, CommandOutput, ExecuteOptions, FailureReport, Outcome, OutcomeStatus, QueryState,
    RunSummary, SkipReason, Verdict,
};
