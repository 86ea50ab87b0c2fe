//! Flatpak backend.

use crate::error::{Error, Result};
use crate::exec::Exec;
use crate::types::{FlatpakApp, Installation, Remote};

/// Backend that executes `flatpak` commands.
#[derive(Debug, Clone, Default)]
pub struct FlatpakBackend;

impl FlatpakBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn is_available(&self, exec: &dyn Exec) -> bool {
        exec.exec("flatpak", &["--version"], false)
            .is_ok_and(|o| o.success)
    }

    /// Check whether an app is installed in the given installation.
    ///
    /// `flatpak info` exits non-zero for apps that are not installed.
    pub fn is_installed(&self, exec: &dyn Exec, app: &FlatpakApp) -> Result<bool> {
        let output = exec.exec(
            "flatpak",
            &["info", app.installation.flag(), &app.app_id],
            false,
        )?;
        Ok(output.success)
    }

    /// Names of configured remotes.
    pub fn remotes(&self, exec: &dyn Exec, installation: Installation) -> Result<Vec<String>> {
        let output = exec.exec(
            "flatpak",
            &["remotes", installation.flag(), "--columns=name"],
            false,
        )?;
        if !output.success {
            return Err(Error::from_flatpak_output(&output.stderr, None));
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    /// Add a remote unless it already exists.
    pub fn ensure_remote(
        &self,
        exec: &dyn Exec,
        remote: &Remote,
        installation: Installation,
    ) -> Result<()> {
        if self
            .remotes(exec, installation)?
            .iter()
            .any(|r| r == &remote.name)
        {
            return Ok(());
        }
        log::info!("adding flatpak remote {} ({})", remote.name, remote.url);
        let output = exec.exec(
            "flatpak",
            &[
                "remote-add",
                "--if-not-exists",
                installation.flag(),
                &remote.name,
                &remote.url,
            ],
            installation.is_privileged(),
        )?;
        if output.success {
            Ok(())
        } else {
            Err(Error::from_flatpak_output(&output.stderr, Some(&remote.name)))
        }
    }

    /// Install an app from its remote.
    pub fn install(&self, exec: &dyn Exec, app: &FlatpakApp) -> Result<()> {
        log::info!("installing flatpak {} from {}", app.app_id, app.remote);
        let output = exec.exec(
            "flatpak",
            &[
                "install",
                "-y",
                "--noninteractive",
                app.installation.flag(),
                &app.remote,
                &app.app_id,
            ],
            app.installation.is_privileged(),
        )?;
        if output.success {
            return Ok(());
        }
        match Error::from_flatpak_output(&output.stderr, Some(&app.app_id)) {
            e if e.is_ignorable() => Ok(()),
            e => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExec;
    use crate::types::RunOutput;

    #[test]
    fn test_is_installed() {
        let exec = ScriptedExec::default()
            .reply("flatpak info --system org.gimp.GIMP", RunOutput::ok("GIMP - ..."))
            .reply(
                "flatpak info --user",
                RunOutput::failed("error: org.gimp.GIMP/*unspecified*/*unspecified* not installed"),
            );
        let backend = FlatpakBackend::new();
        let app = FlatpakApp::new("org.gimp.GIMP", "flathub");
        assert!(backend.is_installed(&exec, &app).unwrap());
        assert!(!backend.is_installed(&exec, &app.user()).unwrap());
    }

    #[test]
    fn test_ensure_remote_skips_existing() {
        let exec = ScriptedExec::default()
            .reply("flatpak remotes --system", RunOutput::ok("fedora\nflathub\n"));
        FlatpakBackend::new()
            .ensure_remote(&exec, &Remote::flathub(), Installation::System)
            .unwrap();
        assert_eq!(exec.calls().len(), 1);
    }

    #[test]
    fn test_ensure_remote_adds_missing() {
        let exec = ScriptedExec::default()
            .reply("flatpak remotes --user", RunOutput::ok("fedora\n"));
        FlatpakBackend::new()
            .ensure_remote(&exec, &Remote::flathub(), Installation::User)
            .unwrap();

        let calls = exec.calls();
        assert_eq!(
            calls[1].0,
            "flatpak remote-add --if-not-exists --user flathub https://dl.flathub.org/repo/flathub.flatpakrepo"
        );
        assert!(!calls[1].1);
    }

    #[test]
    fn test_install_system_is_privileged() {
        let exec = ScriptedExec::default().reply(
            "flatpak install -y --noninteractive --system flathub com.example.Missing",
            RunOutput::failed("error: Nothing matches com.example.Missing in remote flathub"),
        );
        let backend = FlatpakBackend::new();

        backend
            .install(&exec, &FlatpakApp::new("org.gimp.GIMP", "flathub"))
            .unwrap();
        let err = backend
            .install(&exec, &FlatpakApp::new("com.example.Missing", "flathub"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(exec.calls().iter().all(|(_, privileged)| *privileged));
    }
}
