//! Status display - what an apply run would change

use colored::Colorize;
use declarative::{
    ExecutionPlan, QueryState, ResourceKind, ResourceSpec, ResourceStatus, StatusSummary,
    group_by_kind,
};
use similar::ChangeTag;

use crate::resource::repo_file;

/// Section title for a resource kind
pub fn kind_title(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Package => "Packages (dnf)",
        ResourceKind::RepoFile => "Repository files",
        ResourceKind::FlatpakApp => "Flatpaks",
        ResourceKind::GSetting => "Settings (gsettings)",
        ResourceKind::GitCheckout => "Git checkouts",
        ResourceKind::Download => "Downloads",
        ResourceKind::ShellExtension => "GNOME Shell extensions",
    }
}

fn state_symbol(state: QueryState) -> colored::ColoredString {
    match state {
        QueryState::Satisfied => "✓".green(),
        QueryState::Unsatisfied => "+".yellow(),
        QueryState::Unknown => "?".dimmed(),
    }
}

/// Display resource states grouped by kind
///
/// With `all`, satisfied resources are listed too; otherwise only pending
/// ones. With `verbose`, pending repository files show their content diff.
pub fn display_status(plan: &ExecutionPlan, statuses: &[ResourceStatus], all: bool, verbose: bool) {
    let summary = StatusSummary::from_statuses(statuses);
    if !all && !summary.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Provisioning Status".bold()
    );
    println!("│");

    for (kind, group) in group_by_kind(statuses) {
        let shown: Vec<_> = group
            .into_iter()
            .filter(|s| all || s.needs_apply())
            .collect();
        if shown.is_empty() {
            continue;
        }
        println!("│ {}", kind_title(kind).bold());

        for status in shown {
            let sudo = if status.requires_privilege && status.needs_apply() {
                " [sudo]".red().to_string()
            } else {
                String::new()
            };
            let via = status
                .via_fallback
                .as_deref()
                .map(|f| format!(" (via fallback {f})"))
                .unwrap_or_default();
            println!(
                "│   {} {:<30} {}{}{}",
                state_symbol(status.state),
                status.resource_id,
                status.description.dimmed(),
                via.dimmed(),
                sudo
            );

            if verbose
                && status.needs_apply()
                && let Some(resource) = plan.get(&status.resource_id)
            {
                display_content_diff(&resource.spec);
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} satisfied, {} to apply, {} unknown ({} require sudo)",
        summary.satisfied.to_string().green(),
        summary.unsatisfied.to_string().yellow().bold(),
        summary.unknown.to_string().dimmed(),
        summary.privileged.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn display_content_diff(spec: &ResourceSpec) {
    let ResourceSpec::RepoFile(file) = spec else {
        return;
    };
    for (tag, line) in repo_file::diff(file) {
        match tag {
            ChangeTag::Delete => println!("│       {}", format!("- {line}").red()),
            ChangeTag::Insert => println!("│       {}", format!("+ {line}").green()),
            ChangeTag::Equal => {}
        }
    }
}

/// Display the sudo boundary warning
pub fn display_sudo_boundary(statuses: &[ResourceStatus]) {
    let privileged: Vec<_> = statuses
        .iter()
        .filter(|s| s.requires_privilege && s.needs_apply())
        .collect();
    if privileged.is_empty() {
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Privilege Boundary".yellow().bold()
    );
    println!("│");
    println!(
        "│  {}  The following {} operations require sudo:",
        "⚠".yellow(),
        privileged.len()
    );
    println!("│");
    for status in privileged.iter().take(10) {
        println!("│  • {}", status.description);
    }
    if privileged.len() > 10 {
        println!("│  • ... and {} more", privileged.len() - 10);
    }
    println!("│");
    println!("│  Sudo is validated once and released when the run ends.");
    println!("│");
    println!("└─────────────────────────────────────────────────────────────┘");
}
