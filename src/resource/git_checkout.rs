//! Git checkout resource - shallow clones at fixed locations

use declarative::{
    ApplyContext, ApplyError, GitCheckoutSpec, Provider, QueryState, ResourceKind, ResourceSpec,
};
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use super::unsupported;

#[derive(Debug, Default)]
pub struct GitProvider;

impl GitProvider {
    pub fn new() -> Self {
        Self
    }
}

/// What is at the destination
#[derive(Debug, Clone, PartialEq, Eq)]
enum Checkout {
    /// Nothing, or an empty directory
    Absent,
    Matches,
    /// A checkout of another remote or branch
    Differs(String),
    /// Files that are not a git work tree
    Foreign,
}

fn git(dest: &Path, args: &[&str]) -> io::Result<Option<String>> {
    let output = Command::new("git").arg("-C").arg(dest).args(args).output()?;
    Ok(output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

/// Compare remote URLs ignoring a trailing `.git` or `/`
pub fn same_remote(a: &str, b: &str) -> bool {
    fn canonical(url: &str) -> &str {
        let url = url.trim().trim_end_matches('/');
        url.strip_suffix(".git").unwrap_or(url)
    }
    canonical(a) == canonical(b)
}

fn inspect(spec: &GitCheckoutSpec) -> io::Result<Checkout> {
    if !spec.dest.exists() || is_empty_dir(&spec.dest) {
        return Ok(Checkout::Absent);
    }
    if !spec.dest.join(".git").exists() {
        return Ok(Checkout::Foreign);
    }
    let Some(origin) = git(&spec.dest, &["remote", "get-url", "origin"])? else {
        return Ok(Checkout::Differs("no origin remote".to_string()));
    };
    if !same_remote(&origin, &spec.url) {
        return Ok(Checkout::Differs(format!("origin is {origin}")));
    }
    if let Some(branch) = &spec.branch {
        let head = git(&spec.dest, &["rev-parse", "--abbrev-ref", "HEAD"])?.unwrap_or_default();
        if &head != branch {
            return Ok(Checkout::Differs(format!("on branch {head}")));
        }
    }
    Ok(Checkout::Matches)
}

/// Classify a failed `git clone`
pub fn clone_error(stderr: &str) -> ApplyError {
    let lower = stderr.to_lowercase();
    let detail = format!("git clone failed: {}", stderr.trim());
    if lower.contains("could not resolve host")
        || lower.contains("unable to access")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
    {
        ApplyError::network(detail)
    } else if lower.contains("repository not found")
        || lower.contains("does not exist")
        || (lower.contains("remote branch") && lower.contains("not found"))
    {
        ApplyError::not_found(detail)
    } else {
        ApplyError::tool_failed(detail)
    }
}

impl Provider for GitProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::GitCheckout
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        let ResourceSpec::GitCheckout(g) = spec else {
            return QueryState::Unknown;
        };
        match inspect(g) {
            Ok(Checkout::Matches) => QueryState::Satisfied,
            Ok(_) => QueryState::Unsatisfied,
            Err(e) => {
                log::debug!("git: {e}");
                QueryState::Unknown
            }
        }
    }

    fn apply(&self, spec: &ResourceSpec, _ctx: &ApplyContext) -> Result<(), ApplyError> {
        let ResourceSpec::GitCheckout(g) = spec else {
            return Err(unsupported(self.kind(), spec));
        };
        let dest = g.dest.display();
        match inspect(g) {
            Ok(Checkout::Absent) => {}
            Ok(Checkout::Matches) => return Ok(()),
            Ok(Checkout::Differs(why)) => {
                return Err(ApplyError::tool_failed(format!(
                    "{dest} is a different checkout ({why})"
                )));
            }
            Ok(Checkout::Foreign) => {
                return Err(ApplyError::tool_failed(format!(
                    "{dest} exists and is not a git checkout"
                )));
            }
            Err(e) => return Err(ApplyError::from_io(&format!("inspect {dest}"), &e)),
        }

        if let Some(parent) = g.dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ApplyError::from_io(&format!("create {}", parent.display()), &e))?;
        }

        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1"]);
        if let Some(branch) = &g.branch {
            cmd.args(["--branch", branch]);
        }
        cmd.arg(&g.url).arg(&g.dest);
        log::info!("cloning {} into {dest}", g.url);

        let output = cmd.output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ApplyError::tool_failed("git not found in PATH"),
            _ => ApplyError::from_io("git clone", &e),
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(clone_error(&String::from_utf8_lossy(&output.stderr)))
        }
    }
}
