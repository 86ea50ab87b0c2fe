//! Flatpak application resource

use declarative::{
    ApplyContext, ApplyError, FlatpakAppSpec, FlatpakScope, Provider, QueryState, ResourceKind,
    ResourceSpec,
};
use pkgkit::backend::FlatpakBackend;
use pkgkit::{ErrorCategory, Exec, FlatpakApp, Remote, SystemExec};

use super::{ContextExec, pkg_error, unsupported};

/// Installs flatpaks, adding the remote first when a URL is declared
pub struct FlatpakProvider {
    backend: FlatpakBackend,
    is_root: bool,
}

impl FlatpakProvider {
    pub fn new(is_root: bool) -> Self {
        Self {
            backend: FlatpakBackend::new(),
            is_root,
        }
    }

    fn app(spec: &FlatpakAppSpec) -> FlatpakApp {
        let app = FlatpakApp::new(&spec.app_id, &spec.remote);
        match spec.scope {
            FlatpakScope::System => app,
            FlatpakScope::User => app.user(),
        }
    }

    fn remote(spec: &FlatpakAppSpec) -> Option<Remote> {
        spec.remote_url.as_ref().map(|url| Remote {
            name: spec.remote.clone(),
            url: url.clone(),
        })
    }

    pub(crate) fn query_with(&self, exec: &dyn Exec, spec: &FlatpakAppSpec) -> QueryState {
        match self.backend.is_installed(exec, &Self::app(spec)) {
            Ok(true) => QueryState::Satisfied,
            Ok(false) => QueryState::Unsatisfied,
            Err(e) => {
                if e.category() != ErrorCategory::ToolNotFound {
                    log::warn!("{}: {}", spec.app_id, e.diagnostic());
                }
                QueryState::Unknown
            }
        }
    }

    pub(crate) fn apply_with(&self, exec: &dyn Exec, spec: &FlatpakAppSpec) -> Result<(), ApplyError> {
        let app = Self::app(spec);
        if let Some(remote) = Self::remote(spec) {
            self.backend
                .ensure_remote(exec, &remote, app.installation)
                .map_err(|e| pkg_error(&e))?;
        }
        self.backend.install(exec, &app).map_err(|e| pkg_error(&e))
    }
}

impl Provider for FlatpakProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::FlatpakApp
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        match spec {
            ResourceSpec::FlatpakApp(a) => self.query_with(&SystemExec::new(self.is_root), a),
            _ => QueryState::Unknown,
        }
    }

    fn apply(&self, spec: &ResourceSpec, ctx: &ApplyContext) -> Result<(), ApplyError> {
        let ResourceSpec::FlatpakApp(a) = spec else {
            return Err(unsupported(self.kind(), spec));
        };
        self.apply_with(&ContextExec::new(ctx), a)
    }

    fn requires_privilege(&self, spec: &ResourceSpec) -> bool {
        match spec {
            ResourceSpec::FlatpakApp(a) => !self.is_root && Self::app(a).installation.is_privileged(),
            _ => false,
        }
    }
}
