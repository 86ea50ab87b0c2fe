//! Apply runs - status, confirmation, privilege, engine, summary

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyContext, CancelToken, Engine, ExecuteOptions, ExecutionPlan, ProviderRegistry,
    RunSummary, StatusSummary, SudoProvider, Verdict, inspect,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::progress::ApplyProgress;
use crate::state::FileLedgerStore;
use crate::sudo::SudoContext;
use crate::ui;

use super::differ::{display_status, display_sudo_boundary};

/// Options for an apply run, as given on the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Query only, record what would change
    pub dry_run: bool,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    /// Skip the confirmation prompt
    pub yes: bool,
    pub verbose: bool,
    pub quiet: bool,
    /// Process already runs as root
    pub is_root: bool,
    pub ledger_dir: PathBuf,
}

/// Converge the plan; `None` when the user declined
pub fn execute(
    plan: &ExecutionPlan,
    registry: ProviderRegistry,
    opts: &RunOptions,
    cancel: CancelToken,
) -> Result<Option<RunSummary>> {
    // 1. Show what would change
    let statuses = inspect(plan, &registry, opts.timeout);
    let status_summary = StatusSummary::from_statuses(&statuses);
    if !opts.quiet {
        display_status(plan, &statuses, false, opts.verbose);
    }

    // 2. Confirm (unless --yes, a dry run, or nothing to do)
    if status_summary.has_changes() && !opts.yes && !opts.dry_run && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(None);
    }

    // 3. Privilege, acquired once for the whole run. Root always gets a
    // context so privileged commands run directly.
    let sudo: Option<Arc<dyn SudoProvider>> = if opts.dry_run {
        None
    } else if opts.is_root {
        Some(Arc::new(SudoContext::root()))
    } else if status_summary.privileged > 0 {
        acquire_sudo(opts, &statuses)
    } else {
        None
    };
    let ctx = match sudo {
        Some(sudo) => ApplyContext::with_sudo(opts.verbose, sudo),
        None => ApplyContext::new(opts.verbose),
    };

    // 4. Run, persisting every outcome as it lands
    let engine = Engine::new(
        registry,
        ExecuteOptions {
            dry_run: opts.dry_run,
            jobs: opts.jobs,
            timeout: opts.timeout,
            verbose: opts.verbose,
        },
    )
    .with_context(ctx)
    .with_cancel(cancel);

    let mut store = FileLedgerStore::new(&opts.ledger_dir);
    let mut progress = ApplyProgress::new(opts.verbose, opts.quiet);
    let report = engine.run(plan, &mut store, &mut progress)?;

    // 5. Summary
    print_summary(&report.summary);
    if let Some(path) = store.path() {
        ui::dim(&format!("Ledger: {}", path.display()));
    }
    Ok(Some(report.summary))
}

/// Sudo for the run, or `None` (with a warning) when it cannot be had
fn acquire_sudo(
    opts: &RunOptions,
    statuses: &[declarative::ResourceStatus],
) -> Option<Arc<dyn SudoProvider>> {
    if !opts.quiet {
        display_sudo_boundary(statuses);
    }
    match SudoContext::acquire("Apply privileged system configuration") {
        Ok(sudo) => Some(Arc::new(sudo)),
        Err(e) => {
            log::warn!("sudo unavailable: {e:#}");
            ui::warn("Continuing without sudo; privileged resources will fail");
            None
        }
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// One-line reading of a run
pub fn verdict_line(summary: &RunSummary) -> String {
    match summary.verdict() {
        Verdict::NothingToDo => "Nothing to do - system already converged".to_string(),
        Verdict::Converged { applied } => format!("Converged with {applied} applied"),
        Verdict::ConvergedWithFailures { applied, failed } => {
            format!("Converged with {failed} failed ({applied} applied)")
        }
        Verdict::DryRun { pending } => format!("Dry run - {pending} would be applied"),
        Verdict::Cancelled { remaining } => {
            format!("Cancelled - {remaining} resources not started")
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &RunSummary) {
    println!();
    let line = verdict_line(summary);
    match summary.verdict() {
        Verdict::NothingToDo | Verdict::Converged { .. } => {
            println!("  {} {}", "✓".green().bold(), line.bold());
        }
        Verdict::DryRun { .. } => println!("  {} {}", "ℹ".blue(), line),
        Verdict::ConvergedWithFailures { .. } | Verdict::Cancelled { .. } => {
            println!("  {} {}", "⚠".yellow().bold(), line.bold());
        }
    }

    if summary.already_satisfied > 0 {
        println!("    • {} already satisfied", summary.already_satisfied);
    }
    if summary.applied > 0 {
        println!("    • {} applied", summary.applied);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }

    for failure in &summary.failures {
        println!();
        let kind = failure
            .error
            .map(|k| k.description())
            .unwrap_or("Failed");
        println!("  {} {} - {}", "✗".red(), failure.resource_id.bold(), kind);
        if let Some(detail) = &failure.detail {
            println!("    {}", ui::truncate(detail.trim(), 400).dimmed());
        }
        if let Some(kind) = failure.error {
            println!("    {} {}", "→".cyan(), kind.advice());
        }
    }
}
