//! `choro status` - query every resource without changing anything

use anyhow::Result;
use declarative::{StatusSummary, inspect};

use super::Loaded;
use crate::Context;
use crate::cli::StatusArgs;
use crate::engine::differ::display_status;
use crate::progress;

pub fn run(ctx: &Context, args: &StatusArgs) -> Result<()> {
    let loaded = Loaded::load(ctx, args.target.as_deref())?;
    let registry = loaded.registry()?;

    let pb = progress::spinner(&format!("Querying {} resources...", loaded.plan.len()));
    let statuses = inspect(&loaded.plan, &registry, loaded.config.settings.timeout());
    let summary = StatusSummary::from_statuses(&statuses);
    if summary.unknown > 0 {
        progress::finish_error(&pb, &format!("{} resources could not be queried", summary.unknown));
    } else {
        progress::finish_success(&pb, "Queried");
    }

    display_status(&loaded.plan, &statuses, args.all, ctx.verbose > 0);

    if !loaded.config.excluded.is_empty() && !ctx.quiet {
        println!();
        crate::ui::dim(&format!(
            "Not on this host: {}",
            loaded.config.excluded.join(", ")
        ));
    }
    Ok(())
}
