//! Plan file loading
//!
//! A plan file is a TOML document with an optional `[settings]` table and an
//! array of `[[resource]]` tables:
//!
//! ```toml
//! [settings]
//! jobs = 2
//! timeout_secs = 900
//!
//! [[resource]]
//! id = "rpmfusion-free"
//! kind = "package"
//! name = "https://mirrors.rpmfusion.org/free/fedora/rpmfusion-free-release-${fedora}.noarch.rpm"
//!
//! [[resource]]
//! id = "intel-media-driver"
//! kind = "package"
//! name = "intel-media-driver"
//! only_on_cpu = "intel"
//! depends_on = ["rpmfusion-free"]
//! ```
//!
//! Host facts are substituted into every string before the document is
//! typed, and `~` is expanded in path fields afterwards.

use anyhow::{Context, Result};
use declarative::{Resource, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::{CpuVendor, HostFacts};
use crate::paths;

/// Default per-resource timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;

/// Plan validation errors that TOML typing cannot catch
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings.jobs must be at least 1")]
    InvalidJobs,

    #[error("resource `{resource}`: path `{path}` must be absolute")]
    RelativePath { resource: String, path: PathBuf },

    #[error("resource `{resource}`: {message}")]
    InvalidResource { resource: String, message: String },
}

/// Run settings; CLI flags override these
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub jobs: usize,
    /// Per-resource timeout in seconds; 0 disables it
    pub timeout_secs: u64,
    pub scratch_dir: Option<PathBuf>,
    pub ledger_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: 1,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            scratch_dir: None,
            ledger_dir: None,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn scratch_dir(&self) -> Result<PathBuf> {
        match &self.scratch_dir {
            Some(dir) => Ok(paths::expand_tilde(dir)),
            None => paths::scratch_dir(),
        }
    }

    pub fn ledger_dir(&self) -> Result<PathBuf> {
        match &self.ledger_dir {
            Some(dir) => Ok(paths::expand_tilde(dir)),
            None => paths::ledger_dir(),
        }
    }
}

/// One `[[resource]]` table
#[derive(Debug, Clone, Deserialize)]
struct ResourceEntry {
    #[serde(flatten)]
    resource: Resource,
    #[serde(default)]
    only_on_cpu: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    resource: Vec<ResourceEntry>,
}

/// A loaded plan file, filtered for this host
#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub path: PathBuf,
    pub settings: Settings,
    pub resources: Vec<Resource>,
    /// Ids dropped by `only_on_cpu`
    pub excluded: Vec<String>,
}

impl PlanConfig {
    /// Load the plan at `path`, or the default plan file
    pub fn load(path: Option<&Path>, host: &HostFacts) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => paths::plan_file()?,
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read plan file {}", path.display()))?;
        let mut plan = Self::parse(&content, host)
            .with_context(|| format!("Invalid plan file {}", path.display()))?;
        plan.path = path;
        log::debug!(
            "Loaded {} resources from {} ({} excluded on this host)",
            plan.resources.len(),
            plan.path.display(),
            plan.excluded.len()
        );
        Ok(plan)
    }

    /// Parse a plan document and apply host facts
    pub fn parse(content: &str, host: &HostFacts) -> Result<Self> {
        let mut value: toml::Value = toml::from_str(content).context("Failed to parse TOML")?;
        substitute_strings(&mut value, host);
        let doc: PlanDocument = value
            .try_into()
            .context("Failed to read plan document")?;

        if doc.settings.jobs == 0 {
            return Err(ConfigError::InvalidJobs.into());
        }

        let mut resources = Vec::with_capacity(doc.resource.len());
        let mut excluded = Vec::new();
        for entry in doc.resource {
            let id = entry.resource.id.clone();
            if let Some(wanted) = &entry.only_on_cpu {
                let vendor: CpuVendor =
                    wanted
                        .parse()
                        .map_err(|message| ConfigError::InvalidResource {
                            resource: id.clone(),
                            message,
                        })?;
                if vendor != host.cpu_vendor {
                    log::info!("Skipping `{id}`: only on {vendor} CPUs (host is {})", host.cpu_vendor);
                    excluded.push(id);
                    continue;
                }
            }
            resources.push(normalize(entry.resource)?);
        }

        drop_excluded_dependencies(&mut resources, &excluded);

        Ok(Self {
            path: PathBuf::new(),
            settings: doc.settings,
            resources,
            excluded,
        })
    }
}

/// Apply host substitution to every string in the document
fn substitute_strings(value: &mut toml::Value, host: &HostFacts) {
    match value {
        toml::Value::String(s) => *s = host.substitute(s),
        toml::Value::Array(items) => {
            for item in items {
                substitute_strings(item, host);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                substitute_strings(item, host);
            }
        }
        _ => {}
    }
}

/// Expand `~` in path fields and check paths are absolute
fn normalize(mut resource: Resource) -> Result<Resource, ConfigError> {
    let id = resource.id.clone();
    normalize_spec(&id, &mut resource.spec)?;
    for fallback in &mut resource.fallbacks {
        normalize_spec(&id, fallback)?;
    }
    Ok(resource)
}

fn normalize_spec(id: &str, spec: &mut ResourceSpec) -> Result<(), ConfigError> {
    let targets: Vec<&mut PathBuf> = match spec {
        ResourceSpec::RepoFile(f) => vec![&mut f.path],
        ResourceSpec::GitCheckout(g) => vec![&mut g.dest],
        ResourceSpec::Download(d) => {
            if d.run.as_ref().is_some_and(Vec::is_empty) {
                return Err(ConfigError::InvalidResource {
                    resource: id.to_string(),
                    message: "`run` must name a program".to_string(),
                });
            }
            let mut v = vec![&mut d.dest];
            v.extend(d.creates.as_mut());
            v
        }
        _ => Vec::new(),
    };
    for path in targets {
        *path = paths::expand_tilde(path);
        if !path.is_absolute() {
            return Err(ConfigError::RelativePath {
                resource: id.to_string(),
                path: path.clone(),
            });
        }
    }
    Ok(())
}

/// Remove dependency edges pointing at resources excluded on this host
fn drop_excluded_dependencies(resources: &mut [Resource], excluded: &[String]) {
    if excluded.is_empty() {
        return;
    }
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    for resource in resources {
        resource.depends_on.retain(|dep| {
            let keep = !excluded.contains(dep.as_str());
            if !keep {
                log::debug!(
                    "`{}` no longer depends on `{dep}` (excluded on this host)",
                    resource.id
                );
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{FlatpakScope, ResourceKind};

    fn host(vendor: CpuVendor) -> HostFacts {
        HostFacts {
            cpu_vendor: vendor,
            fedora: Some("41".into()),
            arch: "x86_64".into(),
            is_root: false,
        }
    }

    const PLAN: &str = r#"
[settings]
jobs = 2
timeout_secs = 60

[[resource]]
id = "rpmfusion-free"
kind = "package"
name = "https://mirrors.rpmfusion.org/free/fedora/rpmfusion-free-release-${fedora}.noarch.rpm"

[[resource]]
id = "intel-media-driver"
kind = "package"
name = "intel-media-driver"
only_on_cpu = "intel"
depends_on = ["rpmfusion-free"]

[[resource]]
id = "ffmpeg"
kind = "package"
name = "ffmpeg"
allow_erasing = true
depends_on = ["rpmfusion-free", "intel-media-driver"]

[[resource]]
id = "vscode-repo"
kind = "repo_file"
path = "/etc/yum.repos.d/vscode.repo"
content = "[code]\nbaseurl=https://packages.microsoft.com/yumrepos/vscode\n"
mode = 0o644

[[resource]]
id = "mission-center"
kind = "package"
name = "mission-center"

[[resource.fallback]]
kind = "flatpak_app"
app_id = "io.missioncenter.MissionCenter"
scope = "user"

[[resource]]
id = "dotfiles"
kind = "git_checkout"
url = "https://github.com/example/dotfiles.git"
dest = "~/src/dotfiles"
"#;

    #[test]
    fn test_parse_settings_and_resources() {
        let plan = PlanConfig::parse(PLAN, &host(CpuVendor::Intel)).unwrap();
        assert_eq!(plan.settings.jobs, 2);
        assert_eq!(plan.settings.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(plan.resources.len(), 6);
        assert!(plan.excluded.is_empty());

        match &plan.resources[0].spec {
            ResourceSpec::Package(p) => assert!(p.name.ends_with("release-41.noarch.rpm")),
            other => panic!("unexpected spec {other:?}"),
        }
        match &plan.resources[3].spec {
            ResourceSpec::RepoFile(f) => assert_eq!(f.mode, Some(0o644)),
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_fallbacks_are_ordered_specs() {
        let plan = PlanConfig::parse(PLAN, &host(CpuVendor::Intel)).unwrap();
        let mission = &plan.resources[4];
        assert_eq!(mission.fallbacks.len(), 1);
        assert_eq!(mission.fallbacks[0].kind(), ResourceKind::FlatpakApp);
        match &mission.fallbacks[0] {
            ResourceSpec::FlatpakApp(app) => assert_eq!(app.scope, FlatpakScope::User),
            other => panic!("unexpected fallback {other:?}"),
        }
    }

    #[test]
    fn test_only_on_cpu_excludes_and_drops_edges() {
        let plan = PlanConfig::parse(PLAN, &host(CpuVendor::Amd)).unwrap();
        assert_eq!(plan.excluded, vec!["intel-media-driver"]);
        let ffmpeg = plan.resources.iter().find(|r| r.id == "ffmpeg").unwrap();
        assert_eq!(ffmpeg.depends_on, vec!["rpmfusion-free"]);
    }

    #[test]
    fn test_tilde_expanded_in_paths() {
        let plan = PlanConfig::parse(PLAN, &host(CpuVendor::Intel)).unwrap();
        match &plan.resources[5].spec {
            ResourceSpec::GitCheckout(g) => {
                assert!(g.dest.is_absolute());
                assert!(g.dest.ends_with("src/dotfiles"));
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_defaults_when_settings_missing() {
        let plan = PlanConfig::parse("", &host(CpuVendor::Intel)).unwrap();
        assert_eq!(plan.settings, Settings::default());
        assert!(plan.resources.is_empty());
    }

    #[test]
    fn test_rejects_relative_path() {
        let doc = r#"
[[resource]]
id = "repo"
kind = "repo_file"
path = "yum.repos.d/x.repo"
content = ""
"#;
        let err = PlanConfig::parse(doc, &host(CpuVendor::Intel)).unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let doc = "[[resource]]\nid = \"x\"\nkind = \"brew\"\nname = \"x\"\n";
        assert!(PlanConfig::parse(doc, &host(CpuVendor::Intel)).is_err());
    }

    #[test]
    fn test_rejects_bad_cpu_vendor_and_zero_jobs() {
        let doc = "[[resource]]\nid = \"x\"\nkind = \"package\"\nname = \"x\"\nonly_on_cpu = \"arm\"\n";
        let err = PlanConfig::parse(doc, &host(CpuVendor::Intel)).unwrap_err();
        assert!(err.to_string().contains("unknown CPU vendor"));

        let err = PlanConfig::parse("[settings]\njobs = 0\n", &host(CpuVendor::Intel)).unwrap_err();
        assert!(err.to_string().contains("jobs"));
    }

    #[test]
    fn test_load_reports_path() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("plan.toml");
        let err = PlanConfig::load(Some(&missing), &host(CpuVendor::Intel)).unwrap_err();
        assert!(format!("{err:#}").contains("plan.toml"));

        fs::write(&missing, PLAN).unwrap();
        let plan = PlanConfig::load(Some(&missing), &host(CpuVendor::Intel)).unwrap();
        assert_eq!(plan.path, missing);
    }
}
