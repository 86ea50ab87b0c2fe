//! Scoped privilege context
//!
//! Privilege is acquired at most once per run:
//! 1. The plan is asked whether any resource needs root
//! 2. If so, and the process is not root, `sudo -v` validates credentials
//! 3. Providers run privileged commands non-interactively (`sudo -n`)
//! 4. The sudo timestamp is invalidated when the context is dropped

use anyhow::{Context, Result, bail};
use declarative::{CommandOutput, SudoProvider};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Already root; commands run directly
    Root,
    /// Credentials validated with `sudo -v`
    Sudo,
}

/// Scoped sudo context - invalidates the sudo timestamp on drop
#[derive(Debug)]
pub struct SudoContext {
    mode: Mode,
}

impl SudoContext {
    /// Context for a process that already runs as root
    pub fn root() -> Self {
        Self { mode: Mode::Root }
    }

    /// Acquire sudo privileges with a reason shown to the user
    pub fn acquire(reason: &str) -> Result<Self> {
        if Self::is_valid() {
            log::debug!("Reusing cached sudo credentials");
            return Ok(Self { mode: Mode::Sudo });
        }

        eprintln!();
        eprintln!("  Sudo required: {reason}");
        eprintln!();

        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }

        Ok(Self { mode: Mode::Sudo })
    }

    /// Check if sudo is currently valid (without prompting)
    pub fn is_valid() -> bool {
        Command::new("sudo")
            .args(["-n", "true"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    pub fn is_root(&self) -> bool {
        self.mode == Mode::Root
    }

    fn command(&self, cmd: &str, args: &[&str]) -> Command {
        let mut command = match self.mode {
            Mode::Root => Command::new(cmd),
            Mode::Sudo => {
                let mut c = Command::new("sudo");
                c.arg("-n").arg(cmd);
                c
            }
        };
        command.args(args).stdin(Stdio::null());
        command
    }
}

impl SudoProvider for SudoContext {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("privileged: {cmd} {}", args.join(" "));
        let output = self
            .command(cmd, args)
            .output()
            .with_context(|| format!("Failed to execute: sudo {cmd} {}", args.join(" ")))?;
        Ok(output.into())
    }
}

impl Drop for SudoContext {
    fn drop(&mut self) {
        if self.mode == Mode::Sudo {
            let _ = Command::new("sudo").arg("-k").status();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_runs_directly() {
        let ctx = SudoContext::root();
        assert!(ctx.is_root());
        let cmd = ctx.command("dnf", &["install", "-y", "htop"]);
        assert_eq!(cmd.get_program(), "dnf");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["install", "-y", "htop"]);
    }

    #[test]
    fn test_sudo_is_non_interactive() {
        let ctx = SudoContext { mode: Mode::Sudo };
        let cmd = ctx.command("tee", &["/etc/yum.repos.d/x.repo"]);
        assert_eq!(cmd.get_program(), "sudo");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-n", "tee", "/etc/yum.repos.d/x.repo"]);
        // Dropping would run `sudo -k`
        std::mem::forget(ctx);
    }

    #[test]
    fn test_root_runs_command() {
        let ctx = SudoContext::root();
        let out = ctx.run("true", &[]).unwrap();
        assert!(out.success);
    }
}
