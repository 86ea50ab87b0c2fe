use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "choro")]
#[command(version)]
#[command(about = "Declarative, idempotent provisioning for Fedora workstations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Plan file (default: ~/.config/choro/plan.toml)
    #[arg(long, global = true, env = "CHORO_PLAN")]
    pub plan: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the system to the plan
    Apply(ApplyArgs),

    /// Show which resources are satisfied (no changes are made)
    Status(StatusArgs),

    /// Validate the plan and print its execution order
    Plan(TargetArgs),

    /// Show a recorded run
    History(HistoryArgs),

    /// Check the host and the tools providers rely on
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply / Status
// ============================================================================

#[derive(Parser)]
pub struct TargetArgs {
    /// Only this kind or kind.id (dependencies are included)
    ///
    /// Examples: package, flatpak.spotify, gsetting.dark-mode
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only this kind or kind.id (dependencies are included)
    pub target: Option<String>,

    /// Dry run - query only and record what would be applied
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of resources applied in parallel (overrides settings.jobs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-resource timeout in seconds, 0 for none (overrides settings.timeout_secs)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Only this kind or kind.id (dependencies are included)
    pub target: Option<String>,

    /// List satisfied resources too
    #[arg(short, long)]
    pub all: bool,
}

// ============================================================================
// History
// ============================================================================

#[derive(Parser)]
pub struct HistoryArgs {
    /// Run id to show (default: the latest run)
    #[arg(long)]
    pub run: Option<String>,

    /// List recorded run ids instead
    #[arg(short, long)]
    pub list: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from([
            "choro", "apply", "--dry-run", "--jobs", "4", "--timeout", "60", "package",
        ])
        .unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.dry_run);
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.timeout, Some(60));
        assert_eq!(args.target.as_deref(), Some("package"));
    }

    #[test]
    fn test_global_plan_flag() {
        let cli = Cli::try_parse_from(["choro", "status", "--plan", "/tmp/plan.toml", "-vv"])
            .unwrap();
        assert_eq!(cli.plan, Some(PathBuf::from("/tmp/plan.toml")));
        assert_eq!(cli.verbose, 2);
    }
}
