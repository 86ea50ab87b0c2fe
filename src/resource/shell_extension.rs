//! GNOME Shell extension resource, installed from extensions.gnome.org

use declarative::{
    ApplyContext, ApplyError, Provider, QueryState, ResourceKind, ResourceSpec,
    ShellExtensionSpec,
};
use shellext::{ErrorCategory, GnomeExtensionsCli, GnomeExtensionsIndex, Installer};
use std::path::PathBuf;

use super::unsupported;

pub struct ShellExtensionProvider {
    installer: Installer,
}

impl ShellExtensionProvider {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self::with_installer(Installer::new(
            Box::new(GnomeExtensionsIndex::new()),
            Box::new(GnomeExtensionsCli::new()),
            scratch_root,
        ))
    }

    pub fn with_installer(installer: Installer) -> Self {
        Self { installer }
    }

    fn check(&self, spec: &ShellExtensionSpec) -> QueryState {
        match self.installer.status(&spec.uuid) {
            Ok(Some(state)) if state.enabled || !spec.enable => QueryState::Satisfied,
            Ok(_) => QueryState::Unsatisfied,
            Err(e) => {
                log::debug!("{}: {e}", spec.uuid);
                QueryState::Unknown
            }
        }
    }
}

/// Map an install failure onto the engine's taxonomy
pub fn ext_error(err: &shellext::Error) -> ApplyError {
    let detail = err.to_string();
    match err.category() {
        ErrorCategory::Network => ApplyError::network(detail),
        ErrorCategory::NotFound | ErrorCategory::Format => ApplyError::not_found(detail),
        ErrorCategory::Permission => ApplyError::permission_denied(detail),
        ErrorCategory::Tool | ErrorCategory::Other => ApplyError::tool_failed(detail),
    }
}

impl Provider for ShellExtensionProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ShellExtension
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        match spec {
            ResourceSpec::ShellExtension(e) => self.check(e),
            _ => QueryState::Unknown,
        }
    }

    fn apply(&self, spec: &ResourceSpec, _ctx: &ApplyContext) -> Result<(), ApplyError> {
        let ResourceSpec::ShellExtension(e) = spec else {
            return Err(unsupported(self.kind(), spec));
        };
        let report = self
            .installer
            .install(&e.uuid, e.search_term(), e.enable)
            .map_err(|err| ext_error(&err))?;
        log::info!(
            "installed {} (version {}) for GNOME Shell {}",
            report.uuid,
            report.version.map_or_else(|| "?".to_string(), |v| v.to_string()),
            report.shell_version
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ErrorKind;
    use shellext::{ExtensionState, MockIndex, ShellTool, ShellVersion, Step};
    use std::path::Path;

    /// Shell with a fixed extension state
    struct FixedShell {
        state: Option<ExtensionState>,
        available: bool,
    }

    impl ShellTool for FixedShell {
        fn shell_version(&self) -> shellext::Result<ShellVersion> {
            Ok(ShellVersion::new(46))
        }

        fn info(&self, _uuid: &str) -> shellext::Result<Option<ExtensionState>> {
            if self.available {
                Ok(self.state.clone())
            } else {
                Err(shellext::Error::ToolNotFound("gnome-extensions".into()))
            }
        }

        fn install(&self, _archive: &Path) -> shellext::Result<()> {
            Ok(())
        }

        fn enable(&self, _uuid: &str) -> shellext::Result<()> {
            Ok(())
        }
    }

    const UUID: &str = "caffeine@patapon.info";

    fn provider(state: Option<ExtensionState>, available: bool, scratch: &Path) -> ShellExtensionProvider {
        ShellExtensionProvider::with_installer(Installer::new(
            Box::new(MockIndex::new().with_extension("other@example.com", "Other", 7)),
            Box::new(FixedShell { state, available }),
            scratch,
        ))
    }

    fn spec(enable: bool) -> ResourceSpec {
        ResourceSpec::ShellExtension(ShellExtensionSpec {
            uuid: UUID.into(),
            search: Some("caffeine".into()),
            enable,
        })
    }

    fn state(enabled: bool) -> Option<ExtensionState> {
        Some(ExtensionState {
            uuid: UUID.into(),
            enabled,
            state: None,
        })
    }

    #[test]
    fn test_query_states() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(provider(state(true), true, temp.path()).query(&spec(true)), QueryState::Satisfied);
        assert_eq!(provider(state(false), true, temp.path()).query(&spec(true)), QueryState::Unsatisfied);
        assert_eq!(provider(state(false), true, temp.path()).query(&spec(false)), QueryState::Satisfied);
        assert_eq!(provider(None, true, temp.path()).query(&spec(true)), QueryState::Unsatisfied);
        assert_eq!(provider(None, false, temp.path()).query(&spec(true)), QueryState::Unknown);
    }

    #[test]
    fn test_lookup_miss_fails_not_found_and_cleans_scratch() {
        let temp = tempfile::tempdir().unwrap();
        let scratch = temp.path().join("scratch");
        let err = provider(None, true, &scratch)
            .apply(&spec(true), &ApplyContext::new(false))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.detail.starts_with("lookup:"));
        let leftovers = std::fs::read_dir(&scratch).map(Iterator::count).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_error_mapping() {
        let offline = shellext::Error::Http {
            step: Step::Download,
            message: "connection refused".into(),
            status: None,
        };
        assert_eq!(ext_error(&offline).kind, ErrorKind::NetworkUnavailable);
        assert_eq!(
            ext_error(&shellext::Error::Archive("bad zip".into())).kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            ext_error(&shellext::Error::ToolFailed {
                tool: "gnome-extensions".into(),
                stderr: "boom".into()
            })
            .kind,
            ErrorKind::ExternalToolFailed
        );
    }
}
