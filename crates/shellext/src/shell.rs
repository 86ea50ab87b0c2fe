//! Local GNOME Shell tooling.

use crate::error::{Error, Result};
use crate::types::{ExtensionState, ShellVersion};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Operations on the running shell's extensions.
pub trait ShellTool: Send + Sync {
    fn shell_version(&self) -> Result<ShellVersion>;

    /// Current state, or `None` when the extension is not installed
    fn info(&self, uuid: &str) -> Result<Option<ExtensionState>>;

    /// Install (or reinstall) from a zip archive
    fn install(&self, archive: &Path) -> Result<()>;

    fn enable(&self, uuid: &str) -> Result<()>;
}

/// `gnome-extensions` / `gnome-shell` command-line implementation.
///
/// A freshly installed extension is not loaded by a running Wayland session
/// until the next login, so `info` falls back to the user extension
/// directory and the `enabled-extensions` key.
#[derive(Debug, Clone, Default)]
pub struct GnomeExtensionsCli {
    extensions_dir: Option<PathBuf>,
}

impl GnomeExtensionsCli {
    pub fn new() -> Self {
        Self {
            extensions_dir: dirs::data_dir().map(|d| d.join("gnome-shell").join("extensions")),
        }
    }

    fn run(program: &str, args: &[&str]) -> Result<Output> {
        log::debug!("exec: {program} {}", args.join(" "));
        Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::from_spawn(program, e))
    }

    fn check(program: &str, output: &Output) -> Result<()> {
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ToolFailed {
                tool: program.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn enabled_list() -> Result<Vec<String>> {
        let output = Self::run("gsettings", &["get", "org.gnome.shell", "enabled-extensions"])?;
        Self::check("gsettings", &output)?;
        Ok(parse_string_array(&String::from_utf8_lossy(&output.stdout)))
    }

    fn locally_installed(&self, uuid: &str) -> bool {
        self.extensions_dir
            .as_ref()
            .is_some_and(|d| d.join(uuid).join("metadata.json").is_file())
    }
}

impl ShellTool for GnomeExtensionsCli {
    fn shell_version(&self) -> Result<ShellVersion> {
        let output = Self::run("gnome-shell", &["--version"])?;
        Self::check("gnome-shell", &output)?;
        let text = String::from_utf8_lossy(&output.stdout);
        ShellVersion::parse(&text).ok_or_else(|| Error::ToolFailed {
            tool: "gnome-shell".to_string(),
            stderr: format!("unrecognised version output: {}", text.trim()),
        })
    }

    fn info(&self, uuid: &str) -> Result<Option<ExtensionState>> {
        let output = Self::run("gnome-extensions", &["info", uuid])?;
        if output.status.success() {
            let text = String::from_utf8_lossy(&output.stdout);
            return Ok(Some(ExtensionState::parse(uuid, &text)));
        }
        if !self.locally_installed(uuid) {
            return Ok(None);
        }
        let enabled = Self::enabled_list()?.iter().any(|u| u == uuid);
        Ok(Some(ExtensionState {
            uuid: uuid.to_string(),
            enabled,
            state: None,
        }))
    }

    fn install(&self, archive: &Path) -> Result<()> {
        let path = archive.to_string_lossy();
        let output = Self::run("gnome-extensions", &["install", "--force", &path])?;
        Self::check("gnome-extensions", &output)
    }

    fn enable(&self, uuid: &str) -> Result<()> {
        let output = Self::run("gnome-extensions", &["enable", uuid])?;
        if output.status.success() {
            return Ok(());
        }
        // Not loaded yet: record it so the shell enables it at next login
        let mut enabled = Self::enabled_list()?;
        if enabled.iter().any(|u| u == uuid) {
            return Ok(());
        }
        enabled.push(uuid.to_string());
        let value = format_string_array(&enabled);
        log::info!("{uuid} not loaded yet, adding to enabled-extensions");
        let output = Self::run(
            "gsettings",
            &["set", "org.gnome.shell", "enabled-extensions", &value],
        )?;
        Self::check("gsettings", &output)
    }
}

/// Parse a GVariant string array (`['a', 'b']`, `@as []`)
fn parse_string_array(text: &str) -> Vec<String> {
    let text = text.trim().trim_start_matches("@as").trim();
    let inner = text.trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .map(|s| s.trim().trim_matches('\'').trim_matches('"'))
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn format_string_array(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("'{i}'")).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_array() {
        assert_eq!(
            parse_string_array("['caffeine@patapon.info', 'dash-to-dock@micxgx.gmail.com']\n"),
            vec!["caffeine@patapon.info", "dash-to-dock@micxgx.gmail.com"]
        );
        assert!(parse_string_array("@as []").is_empty());
    }

    #[test]
    fn test_format_string_array() {
        let items = vec!["a@b".to_string(), "c@d".to_string()];
        assert_eq!(format_string_array(&items), "['a@b', 'c@d']");
        assert_eq!(parse_string_array(&format_string_array(&items)), items);
    }

    #[test]
    fn test_locally_installed() {
        let temp = tempfile::tempdir().unwrap();
        let ext = temp.path().join("caffeine@patapon.info");
        std::fs::create_dir_all(&ext).unwrap();
        std::fs::write(ext.join("metadata.json"), "{}").unwrap();

        let cli = GnomeExtensionsCli {
            extensions_dir: Some(temp.path().to_path_buf()),
        };
        assert!(cli.locally_installed("caffeine@patapon.info"));
        assert!(!cli.locally_installed("other@example.com"));
    }
}
