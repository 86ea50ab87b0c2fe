//! Providers for every resource kind
//!
//! Each provider adapts one [`ResourceKind`] to the engine's
//! [`Provider`] trait:
//! - `query` inspects the host and never changes it
//! - `apply` converges the host, running privileged steps through the
//!   run's sudo context
//! - `requires_privilege` is decided from the spec alone, before the run

use declarative::{ApplyContext, ApplyError, ProviderRegistry, ResourceKind, ResourceSpec};
use std::path::PathBuf;
use std::sync::Arc;

use crate::host::HostFacts;

pub mod download;
pub mod flatpak_app;
pub mod git_checkout;
pub mod gsetting;
pub mod package;
pub mod repo_file;
pub mod shell_extension;

pub use download::DownloadProvider;
pub use flatpak_app::FlatpakProvider;
pub use git_checkout::GitProvider;
pub use gsetting::GSettingProvider;
pub use package::PackageProvider;
pub use repo_file::RepoFileProvider;
pub use shell_extension::ShellExtensionProvider;

/// Registry with a provider for every kind
pub fn build_registry(host: &HostFacts, scratch_dir: PathBuf) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .register(Arc::new(PackageProvider::new(host.is_root)))
        .register(Arc::new(RepoFileProvider::new(host.is_root)))
        .register(Arc::new(FlatpakProvider::new(host.is_root)))
        .register(Arc::new(GSettingProvider::new()))
        .register(Arc::new(GitProvider::new()))
        .register(Arc::new(DownloadProvider::new(scratch_dir.clone())))
        .register(Arc::new(ShellExtensionProvider::new(scratch_dir)));
    registry
}

/// Routes pkgkit commands through the run's privilege context
///
/// Unprivileged commands run directly. Privileged ones go to the sudo
/// provider acquired for the run; without one they fail as a permission
/// error instead of prompting.
pub struct ContextExec<'a> {
    ctx: &'a ApplyContext,
}

impl<'a> ContextExec<'a> {
    pub fn new(ctx: &'a ApplyContext) -> Self {
        Self { ctx }
    }
}

impl pkgkit::Exec for ContextExec<'_> {
    fn exec(&self, program: &str, args: &[&str], privileged: bool) -> pkgkit::Result<pkgkit::RunOutput> {
        if !privileged {
            return pkgkit::SystemExec::new(false).exec(program, args, false);
        }
        let sudo = self.ctx.sudo.as_ref().ok_or_else(|| pkgkit::Error::Permission {
            message: format!("{program} needs root and no sudo session is available"),
        })?;
        let output = sudo.run(program, args).map_err(|e| pkgkit::Error::Permission {
            message: format!("{e:#}"),
        })?;
        Ok(pkgkit::RunOutput {
            success: output.success,
            stdout: output.stdout_str(),
            stderr: output.stderr_str(),
        })
    }
}

/// Map a classified package-manager error onto the engine's taxonomy
pub fn pkg_error(err: &pkgkit::Error) -> ApplyError {
    use pkgkit::ErrorCategory;

    let detail = err.diagnostic();
    match err.category() {
        ErrorCategory::Network => ApplyError::network(detail),
        ErrorCategory::NotFound => ApplyError::not_found(detail),
        ErrorCategory::Permission => ApplyError::permission_denied(detail),
        ErrorCategory::Conflict
        | ErrorCategory::AlreadyInstalled
        | ErrorCategory::ToolNotFound
        | ErrorCategory::Other => ApplyError::tool_failed(detail),
    }
}

/// Error for a spec routed to the wrong provider
pub(crate) fn unsupported(provider: ResourceKind, spec: &ResourceSpec) -> ApplyError {
    ApplyError::unsupported(provider, spec.kind())
}

/// Replace `{path}` placeholders in command arguments
pub(crate) fn substitute_path(args: &[String], path: &str) -> Vec<String> {
    args.iter().map(|a| a.replace("{path}", path)).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::Result;
    use declarative::{CommandOutput, SudoProvider};
    use std::sync::Mutex;

    /// Sudo double that records commands and answers with a fixed result
    #[derive(Default)]
    pub struct RecordingSudo {
        pub calls: Mutex<Vec<String>>,
        pub fail_with: Option<String>,
    }

    impl RecordingSudo {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SudoProvider for RecordingSudo {
        fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{cmd} {}", args.join(" ")));
            Ok(match &self.fail_with {
                Some(stderr) => CommandOutput {
                    stdout: Vec::new(),
                    stderr: stderr.clone().into_bytes(),
                    success: false,
                },
                None => CommandOutput {
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    success: true,
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSudo;
    use super::*;
    use declarative::ErrorKind;
    use pkgkit::Exec;

    #[test]
    fn test_registry_covers_every_kind() {
        let host = HostFacts {
            is_root: false,
            ..HostFacts::detect()
        };
        let registry = build_registry(&host, std::env::temp_dir());
        for kind in ResourceKind::ALL {
            assert!(registry.get(kind).is_some(), "no provider for {kind}");
        }
    }

    #[test]
    fn test_privileged_exec_without_sudo_is_permission_error() {
        let ctx = ApplyContext::new(false);
        let err = ContextExec::new(&ctx)
            .exec("dnf", &["install", "-y", "htop"], true)
            .unwrap_err();
        assert_eq!(pkg_error(&err).kind, ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_privileged_exec_goes_through_sudo() {
        let sudo = Arc::new(RecordingSudo::default());
        let ctx = ApplyContext::with_sudo(false, sudo.clone());
        let out = ContextExec::new(&ctx)
            .exec("dnf", &["install", "-y", "htop"], true)
            .unwrap();
        assert!(out.success);
        assert_eq!(sudo.calls(), vec!["dnf install -y htop"]);
    }

    #[test]
    fn test_pkg_error_mapping() {
        let cases = [
            (
                pkgkit::Error::Network {
                    message: "Curl error (6)".into(),
                },
                ErrorKind::NetworkUnavailable,
            ),
            (
                pkgkit::Error::NotFound { name: "steamm".into() },
                ErrorKind::NotFound,
            ),
            (
                pkgkit::Error::Conflict {
                    message: "ffmpeg-free conflicts".into(),
                },
                ErrorKind::ExternalToolFailed,
            ),
            (
                pkgkit::Error::ToolNotFound("flatpak".into()),
                ErrorKind::ExternalToolFailed,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(pkg_error(&err).kind, kind, "{err}");
        }
    }

    #[test]
    fn test_substitute_path() {
        let args = vec!["sh".to_string(), "{path}".to_string(), "--prefix={path}.d".to_string()];
        assert_eq!(
            substitute_path(&args, "/opt/tool/install.sh"),
            vec!["sh", "/opt/tool/install.sh", "--prefix=/opt/tool/install.sh.d"]
        );
    }
}
