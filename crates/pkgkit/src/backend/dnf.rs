//! dnf/rpm backend.

use crate::error::{Error, Result};
use crate::exec::Exec;
use crate::types::RpmPackage;
use std::slice;

/// Backend that drives `rpm` for queries and `dnf` for installs.
#[derive(Debug, Clone)]
pub struct DnfBackend {
    dnf: String,
}

impl Default for DnfBackend {
    fn default() -> Self {
        Self {
            dnf: "dnf".to_string(),
        }
    }
}

impl DnfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific dnf binary (`dnf5`, `/usr/bin/dnf`)
    pub fn with_binary(dnf: impl Into<String>) -> Self {
        Self { dnf: dnf.into() }
    }

    pub fn is_available(&self, exec: &dyn Exec) -> bool {
        exec.exec(&self.dnf, &["--version"], false)
            .is_ok_and(|o| o.success)
    }

    /// Check whether a package (or group) is installed.
    pub fn is_installed(&self, exec: &dyn Exec, package: &RpmPackage) -> Result<bool> {
        if package.group {
            return self.is_group_installed(exec, &package.name);
        }

        let output = exec.exec("rpm", &["-q", "--whatprovides", &package.name], false)?;
        if output.success {
            return Ok(true);
        }
        let text = format!("{}{}", output.stdout, output.stderr);
        if text.contains("is not installed") || text.contains("no package provides") {
            Ok(false)
        } else {
            Err(Error::CommandFailed {
                message: format!("rpm query failed for {}", package.name),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    fn is_group_installed(&self, exec: &dyn Exec, group: &str) -> Result<bool> {
        let output = exec.exec(&self.dnf, &["group", "list", "--installed"], false)?;
        if !output.success {
            return Err(Error::from_dnf_output(&output.stderr, Some(group)));
        }
        Ok(group_listed(&output.stdout, group))
    }

    /// Install a package or group; always privileged.
    pub fn install(&self, exec: &dyn Exec, package: &RpmPackage) -> Result<()> {
        let args = install_args(package);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        log::info!("installing {package} via {}", self.dnf);
        let output = exec.exec(&self.dnf, &args, true)?;
        if output.success {
            return Ok(());
        }
        match Error::from_dnf_output(&output.stderr, Some(&package.name)) {
            e if e.is_ignorable() => Ok(()),
            e => Err(e),
        }
    }
}

/// Argument vector for `dnf install`
pub fn install_args(package: &RpmPackage) -> Vec<String> {
    let mut args: Vec<String> = if package.group {
        vec!["group".into(), "install".into()]
    } else {
        vec!["install".into()]
    };
    args.push("-y".into());
    if package.allow_erasing {
        args.push("--allowerasing".into());
    }
    if let Some(repo) = &package.repo {
        args.push(format!("--repo={repo}"));
    }
    args.push(package.name.clone());
    args
}

/// Whether `dnf group list --installed` output mentions the group
///
/// Matches the group id or its display name, case-insensitively. dnf5 prints
/// `id  Display Name  yes` rows; dnf4 prints bare names under a heading.
fn group_listed(stdout: &str, group: &str) -> bool {
    let wanted = words(group);
    stdout.lines().any(|line| {
        let row = words(line);
        let Some((id, rest)) = row.split_first() else {
            return false;
        };
        let name = match rest.split_last() {
            Some((flag, name)) if flag == "yes" || flag == "no" => name,
            _ => rest,
        };
        row == wanted || slice::from_ref(id) == wanted.as_slice() || name == wanted.as_slice()
    })
}

fn words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExec;
    use crate::types::RunOutput;

    #[test]
    fn test_install_args() {
        assert_eq!(install_args(&RpmPackage::new("htop")), vec!["install", "-y", "htop"]);
        assert_eq!(
            install_args(&RpmPackage::new("ffmpeg").allow_erasing().from_repo("rpmfusion-free")),
            vec!["install", "-y", "--allowerasing", "--repo=rpmfusion-free", "ffmpeg"]
        );
        assert_eq!(
            install_args(&RpmPackage::group("multimedia")),
            vec!["group", "install", "-y", "multimedia"]
        );
    }

    #[test]
    fn test_is_installed_via_rpm() {
        let exec = ScriptedExec::default()
            .reply("rpm -q --whatprovides htop", RunOutput::ok("htop-3.3.0-2.fc40.x86_64\n"))
            .reply(
                "rpm -q --whatprovides vlc",
                RunOutput {
                    success: false,
                    stdout: "no package provides vlc\n".into(),
                    stderr: String::new(),
                },
            );
        let dnf = DnfBackend::new();
        assert!(dnf.is_installed(&exec, &RpmPackage::new("htop")).unwrap());
        assert!(!dnf.is_installed(&exec, &RpmPackage::new("vlc")).unwrap());
        assert!(exec.calls().iter().all(|(_, privileged)| !privileged));
    }

    #[test]
    fn test_group_installed() {
        let listing = "ID                   Name                 Installed\nmultimedia           Multimedia           yes\n";
        let exec = ScriptedExec::default()
            .reply("dnf group list --installed", RunOutput::ok(listing));
        let dnf = DnfBackend::new();
        assert!(dnf.is_installed(&exec, &RpmPackage::group("multimedia")).unwrap());
        assert!(!dnf.is_installed(&exec, &RpmPackage::group("kde-desktop")).unwrap());
    }

    #[test]
    fn test_group_matched_by_display_name() {
        let listing = "ID                   Name                 Installed\n\
                       development-tools    Development Tools    yes\n\
                       c-development        C Development Tools and Libraries yes\n";
        assert!(group_listed(listing, "Development Tools"));
        assert!(group_listed(listing, "development-tools"));
        assert!(group_listed(listing, "C Development Tools and Libraries"));
        assert!(!group_listed(listing, "Development"));
        assert!(!group_listed(listing, "Tools"));

        let dnf4 = "Installed Groups:\n   Development Tools\n";
        assert!(group_listed(dnf4, "development tools"));
    }

    #[test]
    fn test_install_is_privileged_and_classified() {
        let exec = ScriptedExec::default().reply(
            "dnf install -y steamm",
            RunOutput::failed("Error: Unable to find a match: steamm"),
        );
        let dnf = DnfBackend::new();

        dnf.install(&exec, &RpmPackage::new("htop")).unwrap();
        let err = dnf.install(&exec, &RpmPackage::new("steamm")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(exec.calls().iter().all(|(_, privileged)| *privileged));
    }

    #[test]
    fn test_install_already_installed_is_ok() {
        let exec = ScriptedExec::default().reply(
            "dnf install -y htop",
            RunOutput::failed("Package htop-3.3.0 is already installed."),
        );
        DnfBackend::new()
            .install(&exec, &RpmPackage::new("htop"))
            .unwrap();
    }
}
