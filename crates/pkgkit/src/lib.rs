//! # pkgkit
//!
//! dnf/rpm and Flatpak package management for Fedora hosts.
//!
//! This crate provides:
//! - Installed-state queries (`rpm -q`, `dnf group list`, `flatpak info`)
//! - Installs through `dnf` and `flatpak`, including remote setup
//! - Classification of tool failures into [`ErrorCategory`]
//!
//! ## Example
//!
//! ```no_run
//! use pkgkit::{Client, RpmPackage, SystemExec};
//!
//! let client = Client::new(Box::new(SystemExec::new(false)));
//! let htop = RpmPackage::new("htop");
//! if !client.is_installed(&htop).unwrap_or(false) {
//!     client.install(&htop).expect("install failed");
//! }
//! ```

#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod exec;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use exec::{Exec, SystemExec};
pub use types::{FlatpakApp, Installation, Remote, RpmPackage, RunOutput};

use backend::{DnfBackend, FlatpakBackend};

/// High-level client bundling both backends with one executor.
pub struct Client {
    exec: Box<dyn Exec>,
    dnf: DnfBackend,
    flatpak: FlatpakBackend,
}

impl Client {
    pub fn new(exec: Box<dyn Exec>) -> Self {
        Self {
            exec,
            dnf: DnfBackend::new(),
            flatpak: FlatpakBackend::new(),
        }
    }

    pub fn dnf_available(&self) -> bool {
        self.dnf.is_available(self.exec.as_ref())
    }

    pub fn flatpak_available(&self) -> bool {
        self.flatpak.is_available(self.exec.as_ref())
    }

    pub fn is_installed(&self, package: &RpmPackage) -> Result<bool> {
        self.dnf.is_installed(self.exec.as_ref(), package)
    }

    pub fn install(&self, package: &RpmPackage) -> Result<()> {
        self.dnf.install(self.exec.as_ref(), package)
    }

    pub fn is_app_installed(&self, app: &FlatpakApp) -> Result<bool> {
        self.flatpak.is_installed(self.exec.as_ref(), app)
    }

    /// Ensure the remote exists (when given), then install the app.
    pub fn install_app(&self, app: &FlatpakApp, remote: Option<&Remote>) -> Result<()> {
        if let Some(remote) = remote {
            self.flatpak
                .ensure_remote(self.exec.as_ref(), remote, app.installation)?;
        }
        self.flatpak.install(self.exec.as_ref(), app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExec;

    #[test]
    fn test_install_app_adds_remote_first() {
        let client = Client::new(Box::new(ScriptedExec::default()));
        let app = FlatpakApp::new("com.spotify.Client", "flathub");
        client
            .install_app(&app, Some(&Remote::flathub()))
            .unwrap();
    }

    #[test]
    fn test_package_display() {
        assert_eq!(RpmPackage::new("htop").to_string(), "htop");
        assert_eq!(RpmPackage::group("multimedia").to_string(), "@multimedia");
    }
}
