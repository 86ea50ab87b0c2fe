use anyhow::Result;
use colored::Colorize;
use declarative::ExecutionPlan;
use rayon::prelude::*;
use shellext::{GnomeExtensionsCli, ShellTool};

use crate::Context;
use crate::config::PlanConfig;
use crate::host::{CpuVendor, HostFacts};
use crate::runner;
use crate::sudo::SudoContext;
use crate::{paths, ui};

struct Issue {
    category: &'static str,
    summary: String,
    detail: Option<String>,
    fix: Option<String>,
    fix_cmd: Option<String>,
}

/// Tools the providers shell out to: (command, used by, install hint)
const TOOLS: &[(&str, &str, &str)] = &[
    ("rpm", "package queries", "sudo dnf install -y rpm"),
    ("dnf", "package installs", "sudo dnf install -y dnf5"),
    ("flatpak", "flatpak apps", "sudo dnf install -y flatpak"),
    ("git", "git checkouts", "sudo dnf install -y git"),
    ("gsettings", "settings", "sudo dnf install -y glib2"),
    (
        "gnome-extensions",
        "shell extensions",
        "sudo dnf install -y gnome-shell",
    ),
    ("sudo", "privileged resources", "su -c 'dnf install -y sudo'"),
];

pub fn run(ctx: &Context) -> Result<()> {
    ui::header("System Health Check");

    let mut issues: Vec<Issue> = Vec::new();
    let host = HostFacts::detect();

    check_host(&host, &mut issues);
    check_privilege(&host, &mut issues);
    check_tools(&mut issues);
    check_plan(ctx, &host, &mut issues);

    println!();
    if issues.is_empty() {
        ui::success("All checks passed");
    } else {
        print_issue_summary(&issues);
    }

    Ok(())
}

fn print_issue_summary(issues: &[Issue]) {
    let count = issues.len();
    let label = if count == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{count} {label} Found"));

    for (i, issue) in issues.iter().enumerate() {
        println!(
            "  {}  {} {}",
            format!("{}.", i + 1).bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(detail) = &issue.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        if let Some(cmd) = &issue.fix_cmd {
            println!("      {} {}", "$".dimmed(), cmd.bold());
        }
        println!();
    }
}

fn check_host(host: &HostFacts, issues: &mut Vec<Issue>) {
    ui::section("Host");

    ui::kv("CPU vendor", host.cpu_vendor.as_str());
    if host.cpu_vendor == CpuVendor::Unknown {
        issues.push(Issue {
            category: "Host",
            summary: "CPU vendor could not be detected".into(),
            detail: Some("Resources with only_on_cpu will be excluded".into()),
            fix: None,
            fix_cmd: None,
        });
    }

    match &host.fedora {
        Some(release) => ui::kv("Fedora", release),
        None => {
            ui::kv("Fedora", &"not detected".red().to_string());
            issues.push(Issue {
                category: "Host",
                summary: "This does not look like a Fedora system".into(),
                detail: Some("${fedora} in the plan will not be substituted".into()),
                fix: None,
                fix_cmd: Some("cat /etc/os-release".into()),
            });
        }
    }
    ui::kv("Architecture", &host.arch);

    match GnomeExtensionsCli::new().shell_version() {
        Ok(version) => ui::kv("GNOME Shell", &version.to_string()),
        Err(e) => {
            ui::kv("GNOME Shell", &"unavailable".yellow().to_string());
            issues.push(Issue {
                category: "Host",
                summary: "GNOME Shell version unavailable".into(),
                detail: Some(e.to_string()),
                fix: Some("Shell extensions can only be installed inside a GNOME session".into()),
                fix_cmd: None,
            });
        }
    }
}

fn check_privilege(host: &HostFacts, issues: &mut Vec<Issue>) {
    ui::section("Privilege");

    if host.is_root {
        println!("  {} running as root", "✓".green());
    } else if SudoContext::is_valid() {
        println!("  {} sudo credentials cached", "✓".green());
    } else if runner::command_exists("sudo") {
        println!(
            "  {} sudo available {}",
            "○".dimmed(),
            "(will prompt once per run)".dimmed()
        );
    } else {
        println!("  {} sudo {}", "✗".red(), "(missing)".red());
        issues.push(Issue {
            category: "Privilege",
            summary: "Not root and sudo is not installed".into(),
            detail: Some("Packages, system flatpaks and /etc files will fail".into()),
            fix: Some("Install sudo or run choro as root".into()),
            fix_cmd: None,
        });
    }
}

fn check_tools(issues: &mut Vec<Issue>) {
    ui::section("Tools");

    let found: Vec<bool> = TOOLS
        .par_iter()
        .map(|(cmd, _, _)| runner::command_exists(cmd))
        .collect();

    for ((cmd, used_by, hint), ok) in TOOLS.iter().zip(found) {
        if ok {
            println!("  {} {} - {}", "✓".green(), cmd, used_by.dimmed());
        } else {
            println!("  {} {} - {} {}", "✗".red(), cmd, used_by, "(missing)".red());
            issues.push(Issue {
                category: "Tools",
                summary: format!("{cmd} is not installed"),
                detail: Some(format!("Needed for {used_by}")),
                fix: Some(format!("Install {cmd}")),
                fix_cmd: Some((*hint).to_string()),
            });
        }
    }
}

fn check_plan(ctx: &Context, host: &HostFacts, issues: &mut Vec<Issue>) {
    ui::section("Plan");

    let config = match PlanConfig::load(ctx.plan.as_deref(), host) {
        Ok(c) => c,
        Err(e) => {
            println!("  {} {}", "✗".red(), "plan file".red());
            issues.push(Issue {
                category: "Plan",
                summary: "Plan file could not be loaded".into(),
                detail: Some(format!("{e:#}")),
                fix: Some(match paths::plan_file() {
                    Ok(p) => format!("Create {} or pass --plan", p.display()),
                    Err(_) => "Pass --plan".into(),
                }),
                fix_cmd: None,
            });
            return;
        }
    };

    ui::kv("File", &config.path.display().to_string());
    match ExecutionPlan::new(config.resources.clone()) {
        Ok(plan) => {
            println!(
                "  {} {} resources in {} layers ({} excluded on this host)",
                "✓".green(),
                plan.len(),
                plan.layers().len(),
                config.excluded.len()
            );
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            issues.push(Issue {
                category: "Plan",
                summary: "Plan does not validate".into(),
                detail: Some(e.to_string()),
                fix: Some("Fix the ids or depends_on entries named above".into()),
                fix_cmd: None,
            });
        }
    }

    for (label, dir) in [
        ("Ledger dir", config.settings.ledger_dir()),
        ("Scratch dir", config.settings.scratch_dir()),
    ] {
        match dir {
            Ok(d) => ui::kv(label, &d.display().to_string()),
            Err(e) => issues.push(Issue {
                category: "Plan",
                summary: format!("{label} could not be resolved"),
                detail: Some(format!("{e:#}")),
                fix: Some("Ensure $HOME is set".into()),
                fix_cmd: None,
            }),
        }
    }
}
