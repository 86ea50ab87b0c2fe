//! dnf package resource

use declarative::{
    ApplyContext, ApplyError, PackageSpec, Provider, QueryState, ResourceKind, ResourceSpec,
};
use pkgkit::backend::DnfBackend;
use pkgkit::{ErrorCategory, Exec, RpmPackage, SystemExec};

use super::{ContextExec, pkg_error, unsupported};

/// Installs packages and groups with dnf, queries with rpm
pub struct PackageProvider {
    dnf: DnfBackend,
    is_root: bool,
}

impl PackageProvider {
    pub fn new(is_root: bool) -> Self {
        Self {
            dnf: DnfBackend::new(),
            is_root,
        }
    }

    /// Package handed to dnf for installation
    fn install_target(spec: &PackageSpec) -> RpmPackage {
        let mut package = if spec.group {
            RpmPackage::group(&spec.name)
        } else {
            RpmPackage::new(&spec.name)
        };
        if spec.allow_erasing {
            package = package.allow_erasing();
        }
        if let Some(repo) = &spec.repo {
            package = package.from_repo(repo);
        }
        package
    }

    /// Package asked about by the installed-state query
    fn query_target(spec: &PackageSpec) -> RpmPackage {
        if spec.group {
            RpmPackage::group(&spec.name)
        } else {
            RpmPackage::new(spec.query_name())
        }
    }

    pub(crate) fn query_with(&self, exec: &dyn Exec, spec: &PackageSpec) -> QueryState {
        match self.dnf.is_installed(exec, &Self::query_target(spec)) {
            Ok(true) => QueryState::Satisfied,
            Ok(false) => QueryState::Unsatisfied,
            Err(e) => {
                if e.category() != ErrorCategory::ToolNotFound {
                    log::warn!("{}: {}", spec.name, e.diagnostic());
                }
                QueryState::Unknown
            }
        }
    }

    pub(crate) fn apply_with(&self, exec: &dyn Exec, spec: &PackageSpec) -> Result<(), ApplyError> {
        self.dnf
            .install(exec, &Self::install_target(spec))
            .map_err(|e| pkg_error(&e))
    }
}

impl Provider for PackageProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Package
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        match spec {
            ResourceSpec::Package(p) => self.query_with(&SystemExec::new(self.is_root), p),
            _ => QueryState::Unknown,
        }
    }

    fn apply(&self, spec: &ResourceSpec, ctx: &ApplyContext) -> Result<(), ApplyError> {
        let ResourceSpec::Package(p) = spec else {
            return Err(unsupported(self.kind(), spec));
        };
        self.apply_with(&ContextExec::new(ctx), p)
    }

    fn requires_privilege(&self, _spec: &ResourceSpec) -> bool {
        !self.is_root
    }
}
