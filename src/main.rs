mod cli;
mod commands;
mod config;
mod engine;
mod host;
mod paths;
mod progress;
mod resource;
mod runner;
mod state;
mod sudo;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use declarative::CancelToken;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// `--plan`, when given
    pub plan: Option<PathBuf>,
}

/// Exit status for a run that finished with failed resources
const EXIT_FAILURES: u8 = 2;

static CANCEL_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

#[allow(unsafe_code)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    if let Some(flag) = CANCEL_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
    // A second Ctrl-C terminates immediately
    // SAFETY: signal() is async-signal-safe
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

/// Cancel the token on Ctrl-C; resources already running finish first
#[allow(unsafe_code)]
fn install_sigint_handler(token: &CancelToken) {
    if CANCEL_FLAG.set(token.flag()).is_err() {
        return;
    }
    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler only touches an already-initialised atomic
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!("Could not install Ctrl-C handler");
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        plan: cli.plan,
    };

    match cli.command {
        Command::Apply(args) => {
            let cancel = CancelToken::new();
            install_sigint_handler(&cancel);
            match commands::apply::run(&ctx, &args, cancel)? {
                Some(summary) if !summary.is_success() => Ok(ExitCode::from(EXIT_FAILURES)),
                _ => Ok(ExitCode::SUCCESS),
            }
        }
        Command::Status(args) => commands::status::run(&ctx, &args).map(|()| ExitCode::SUCCESS),
        Command::Plan(args) => commands::plan::run(&ctx, &args).map(|()| ExitCode::SUCCESS),
        Command::History(args) => commands::history::run(&ctx, &args).map(|()| ExitCode::SUCCESS),
        Command::Doctor => commands::doctor::run(&ctx).map(|()| ExitCode::SUCCESS),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "choro", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
