//! `choro history` - render a persisted ledger

use anyhow::Result;
use colored::Colorize;
use declarative::{OutcomeStatus, RunSummary};

use crate::Context;
use crate::cli::HistoryArgs;
use crate::config::PlanConfig;
use crate::engine::print_summary;
use crate::host::HostFacts;
use crate::state::{self, StoredRun};
use crate::ui;

pub fn run(ctx: &Context, args: &HistoryArgs) -> Result<()> {
    let dir = ledger_dir(ctx)?;

    if args.list {
        let runs = state::list_runs(&dir)?;
        if runs.is_empty() {
            ui::info(&format!("No runs recorded in {}", dir.display()));
        }
        for id in runs {
            println!("  {id}");
        }
        return Ok(());
    }

    match state::load_run(&dir, args.run.as_deref())? {
        Some(run) => {
            render(&run, ctx.verbose > 0);
            Ok(())
        }
        None => {
            ui::info(&format!("No runs recorded in {}", dir.display()));
            Ok(())
        }
    }
}

/// The plan's ledger directory when a plan is readable, else the default
fn ledger_dir(ctx: &Context) -> Result<std::path::PathBuf> {
    match PlanConfig::load(ctx.plan.as_deref(), &HostFacts::detect()) {
        Ok(config) => config.settings.ledger_dir(),
        Err(e) => {
            log::debug!("no plan for ledger settings: {e:#}");
            crate::paths::ledger_dir()
        }
    }
}

fn render(run: &StoredRun, verbose: bool) {
    let header = run.ledger.header();
    ui::header(&format!("Run {}", header.run_id));
    ui::kv("Started", &header.started_at.to_rfc3339());
    ui::kv("Resources", &header.resources.to_string());
    if header.dry_run {
        ui::kv("Mode", "dry run");
    }
    ui::kv("Ledger", &run.path.display().to_string());

    println!();
    for outcome in run.ledger.outcomes() {
        if outcome.status == OutcomeStatus::AlreadySatisfied && !verbose {
            continue;
        }
        let detail = outcome
            .detail
            .as_deref()
            .map(|d| format!(" - {}", ui::truncate(d.trim(), 100)))
            .unwrap_or_default();
        println!(
            "  {} {} {}{}",
            ui::status_symbol(outcome.status),
            outcome.resource_id,
            outcome.status.to_string().dimmed(),
            detail.dimmed()
        );
        if verbose {
            for attempt in &outcome.attempts {
                let mark = if attempt.is_success() { "✓".green() } else { "✗".red() };
                println!("      {mark} {} {}", attempt.kind, attempt.target.dimmed());
            }
        }
    }

    match &run.summary {
        Some(summary) => print_summary(summary),
        None => {
            // Interrupted before the summary was written; derive one from
            // the recorded prefix
            let partial = RunSummary::from_outcomes(run.ledger.outcomes(), true, header.dry_run);
            print_summary(&partial);
            let missing = header.resources.saturating_sub(run.ledger.len());
            ui::warn(&format!(
                "Run did not finish: {missing} resources have no recorded outcome"
            ));
        }
    }
}
