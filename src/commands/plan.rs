//! `choro plan` - validate the plan and print its execution order

use anyhow::Result;
use colored::Colorize;
use declarative::ExecutionPlan;

use super::Loaded;
use crate::Context;
use crate::cli::TargetArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let loaded = Loaded::load(ctx, args.target.as_deref())?;
    // Validates that every kind has a provider
    loaded.registry()?;

    ui::header(&format!("Plan: {}", loaded.config.path.display()));
    print_order(&loaded.plan);
    print_layers(&loaded.plan);

    if !loaded.config.excluded.is_empty() {
        ui::section("Excluded on this host");
        for id in &loaded.config.excluded {
            println!("  {} {}", "-".dimmed(), id.dimmed());
        }
    }
    println!();
    Ok(())
}

fn print_order(plan: &ExecutionPlan) {
    ui::section("Order");
    let width = plan.len().to_string().len();
    for (n, resource) in plan.ordered().enumerate() {
        let deps = if resource.depends_on.is_empty() {
            String::new()
        } else {
            format!(" ← {}", resource.depends_on.join(", "))
        };
        let fallbacks = match resource.fallbacks.len() {
            0 => String::new(),
            1 => " (+1 fallback)".to_string(),
            k => format!(" (+{k} fallbacks)"),
        };
        println!(
            "  {:>width$}. {} {}{}{}",
            n + 1,
            resource.id.bold(),
            resource.description().dimmed(),
            fallbacks.dimmed(),
            deps.cyan()
        );
    }
}

fn print_layers(plan: &ExecutionPlan) {
    ui::section("Layers");
    for (n, layer) in plan.layers().iter().enumerate() {
        let ids: Vec<&str> = layer
            .iter()
            .map(|&i| plan.resources()[i].id.as_str())
            .collect();
        println!("  {} {}", format!("{}:", n + 1).bold(), ids.join(", "));
    }
    ui::dim(&format!(
        "{} resources in {} layers",
        plan.len(),
        plan.layers().len()
    ));
}
