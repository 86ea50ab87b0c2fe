//! `choro apply` - converge the host to the plan

use anyhow::Result;
use declarative::{CancelToken, RunSummary};

use super::Loaded;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{RunOptions, execute};
use crate::ui;

/// Run the plan; `None` when the user declined at the prompt
pub fn run(ctx: &Context, args: &ApplyArgs, cancel: CancelToken) -> Result<Option<RunSummary>> {
    let loaded = Loaded::load(ctx, args.target.as_deref())?;
    let settings = &loaded.config.settings;

    if loaded.plan.is_empty() {
        ui::info(&format!(
            "{} declares no resources for this host",
            loaded.config.path.display()
        ));
        return Ok(Some(RunSummary::default()));
    }

    let timeout = match args.timeout {
        Some(0) => None,
        Some(secs) => Some(std::time::Duration::from_secs(secs)),
        None => settings.timeout(),
    };
    let opts = RunOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.unwrap_or(settings.jobs).max(1),
        timeout,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        quiet: ctx.quiet,
        is_root: loaded.host.is_root,
        ledger_dir: settings.ledger_dir()?,
    };
    log::debug!("apply options: {opts:?}");

    let registry = loaded.registry()?;
    execute(&loaded.plan, registry, &opts, cancel)
}
