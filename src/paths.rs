//! Centralized path resolution for choro
//!
//! # Environment Variables
//!
//! - `CHORO_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/choro`)
//! - `CHORO_STATE_DIR` - Override state directory (ledgers live here)
//! - `CHORO_CACHE_DIR` - Override cache directory (download scratch space)
//!
//! # Path Resolution Priority
//!
//! Each directory resolves in the same order:
//! 1. The `CHORO_*` environment variable
//! 2. The matching `XDG_*_HOME` variable, joined with `choro`
//! 3. `~/.config/choro`, `~/.local/state/choro` or `~/.cache/choro`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "CHORO_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "CHORO_STATE_DIR";

/// Environment variable for cache directory override
pub const ENV_CACHE_DIR: &str = "CHORO_CACHE_DIR";

/// Default plan file name inside the config directory
pub const PLAN_FILE: &str = "plan.toml";

fn resolve(env: &str, xdg: &str, default: &[&str]) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(env) {
        let path = expand(&dir);
        log::debug!("Using {} from {}: {}", default.join("/"), env, path.display());
        return Ok(path);
    }

    if let Ok(base) = std::env::var(xdg)
        && !base.is_empty()
    {
        let path = PathBuf::from(base).join("choro");
        log::debug!("Using {}: {}", xdg, path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = default
        .iter()
        .fold(home, |p, part| p.join(part))
        .join("choro");
    log::debug!("Using default dir: {}", path.display());
    Ok(path)
}

/// Get the choro config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve(ENV_CONFIG_DIR, "XDG_CONFIG_HOME", &[".config"])
}

/// Get the choro state directory path
pub fn state_dir() -> Result<PathBuf> {
    resolve(ENV_STATE_DIR, "XDG_STATE_HOME", &[".local", "state"])
}

/// Get the choro cache directory path
pub fn cache_dir() -> Result<PathBuf> {
    resolve(ENV_CACHE_DIR, "XDG_CACHE_HOME", &[".cache"])
}

/// Default plan file (`<config>/plan.toml`)
pub fn plan_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(PLAN_FILE))
}

/// Default ledger directory (`<state>/ledger`)
pub fn ledger_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("ledger"))
}

/// Default scratch directory for downloads and extension archives
pub fn scratch_dir() -> Result<PathBuf> {
    Ok(cache_dir()?.join("scratch"))
}

/// Expand `~` and environment variables in a path string.
///
/// Unknown variables are left untouched.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand only a leading `~` (no variables)
pub fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(text.as_ref()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde(Path::new("~/src/dotfiles")), home.join("src/dotfiles"));
        assert_eq!(
            expand_tilde(Path::new("/etc/yum.repos.d/x.repo")),
            PathBuf::from("/etc/yum.repos.d/x.repo")
        );
    }

    #[test]
    fn test_expand_tilde_keeps_variables() {
        let path = expand_tilde(Path::new("/opt/$basearch/file"));
        assert_eq!(path, PathBuf::from("/opt/$basearch/file"));
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~"), home);
    }
}
