//! Resource model for declarative state management
//!
//! A [`Resource`] is pure data: a unique id, the kind-specific desired state
//! ([`ResourceSpec`]), the ids it depends on, and an ordered list of fallback
//! specs to try when the primary one cannot be applied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Capability tag selecting the provider that handles a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Package,
    RepoFile,
    FlatpakApp,
    GSetting,
    GitCheckout,
    Download,
    ShellExtension,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        Self::Package,
        Self::RepoFile,
        Self::FlatpakApp,
        Self::GSetting,
        Self::GitCheckout,
        Self::Download,
        Self::ShellExtension,
    ];

    /// Stable snake_case name, as used in plan files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::RepoFile => "repo_file",
            Self::FlatpakApp => "flatpak_app",
            Self::GSetting => "gsetting",
            Self::GitCheckout => "git_checkout",
            Self::Download => "download",
            Self::ShellExtension => "shell_extension",
        }
    }

    /// Parse a kind from its name or a common plural alias
    pub fn from_alias(s: &str) -> Option<Self> {
        match s {
            "package" | "packages" | "dnf" => Some(Self::Package),
            "repo_file" | "repos" | "repo" | "files" => Some(Self::RepoFile),
            "flatpak_app" | "flatpak" | "flatpaks" => Some(Self::FlatpakApp),
            "gsetting" | "gsettings" | "settings" => Some(Self::GSetting),
            "git_checkout" | "git" => Some(Self::GitCheckout),
            "download" | "downloads" => Some(Self::Download),
            "shell_extension" | "extensions" | "extension" => Some(Self::ShellExtension),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dnf package or package group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    /// Treat `name` as a comps group (`dnf group install`)
    #[serde(default)]
    pub group: bool,
    /// Pass `--allowerasing` (codec swaps such as ffmpeg-free → ffmpeg)
    #[serde(default)]
    pub allow_erasing: bool,
    /// Restrict installation to one repository id
    #[serde(default)]
    pub repo: Option<String>,
    /// Capability to query instead of `name`, for URL or file installs
    /// (`rpmfusion-free-release` for a release RPM URL)
    #[serde(default)]
    pub provides: Option<String>,
}

impl PackageSpec {
    /// What `rpm -q --whatprovides` is asked about
    pub fn query_name(&self) -> &str {
        self.provides.as_deref().unwrap_or(&self.name)
    }
}

/// A file whose content must match exactly (repo definitions, drop-ins)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFileSpec {
    pub path: PathBuf,
    pub content: String,
    /// Unix permission bits applied after the write
    #[serde(default)]
    pub mode: Option<u32>,
}

/// Where a flatpak is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlatpakScope {
    #[default]
    System,
    User,
}

/// A Flatpak application from a remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatpakAppSpec {
    pub app_id: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// `.flatpakrepo` URL; the remote is added when declared
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub scope: FlatpakScope,
}

fn default_remote() -> String {
    "flathub".to_string()
}

/// A GSettings key with its desired value in GVariant text form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GSettingSpec {
    pub schema: String,
    pub key: String,
    pub value: String,
}

/// A shallow git clone at a fixed location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCheckoutSpec {
    pub url: String,
    pub dest: PathBuf,
    #[serde(default)]
    pub branch: Option<String>,
}

/// A downloaded artifact, optionally executed after download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSpec {
    pub url: String,
    pub dest: PathBuf,
    /// Expected blake3 digest (hex) of the downloaded bytes
    #[serde(default)]
    pub blake3: Option<String>,
    #[serde(default)]
    pub mode: Option<u32>,
    /// Command to run after download; `{path}` is replaced by `dest`
    #[serde(default)]
    pub run: Option<Vec<String>>,
    /// Path whose existence proves the run step already happened
    #[serde(default)]
    pub creates: Option<PathBuf>,
}

/// A GNOME Shell extension resolved through extensions.gnome.org
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellExtensionSpec {
    pub uuid: String,
    /// Search term for the index lookup; defaults to the uuid
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_true")]
    pub enable: bool,
}

fn default_true() -> bool {
    true
}

impl ShellExtensionSpec {
    pub fn search_term(&self) -> &str {
        self.search.as_deref().unwrap_or(&self.uuid)
    }
}

/// Kind-specific desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Package(PackageSpec),
    RepoFile(RepoFileSpec),
    FlatpakApp(FlatpakAppSpec),
    #[serde(rename = "gsetting")]
    GSetting(GSettingSpec),
    GitCheckout(GitCheckoutSpec),
    Download(DownloadSpec),
    ShellExtension(ShellExtensionSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Package(_) => ResourceKind::Package,
            Self::RepoFile(_) => ResourceKind::RepoFile,
            Self::FlatpakApp(_) => ResourceKind::FlatpakApp,
            Self::GSetting(_) => ResourceKind::GSetting,
            Self::GitCheckout(_) => ResourceKind::GitCheckout,
            Self::Download(_) => ResourceKind::Download,
            Self::ShellExtension(_) => ResourceKind::ShellExtension,
        }
    }

    /// The thing being managed, for display ("vlc", "/etc/yum.repos.d/x.repo")
    pub fn target(&self) -> String {
        match self {
            Self::Package(p) => p.name.clone(),
            Self::RepoFile(f) => f.path.display().to_string(),
            Self::FlatpakApp(a) => format!("{}:{}", a.remote, a.app_id),
            Self::GSetting(g) => format!("{}.{}", g.schema, g.key),
            Self::GitCheckout(g) => g.dest.display().to_string(),
            Self::Download(d) => d.dest.display().to_string(),
            Self::ShellExtension(e) => e.uuid.clone(),
        }
    }

    /// Human-readable description of the desired state
    pub fn description(&self) -> String {
        match self {
            Self::Package(p) if p.group => format!("Install package group {} via dnf", p.name),
            Self::Package(p) => format!("Install {} via dnf", p.name),
            Self::RepoFile(f) => format!("Write {}", f.path.display()),
            Self::FlatpakApp(a) => format!("Install flatpak {} from {}", a.app_id, a.remote),
            Self::GSetting(g) => format!("Set {} {} = {}", g.schema, g.key, g.value),
            Self::GitCheckout(g) => format!("Clone {} into {}", g.url, g.dest.display()),
            Self::Download(d) if d.run.is_some() => format!("Download and run {}", d.url),
            Self::Download(d) => format!("Download {} to {}", d.url, d.dest.display()),
            Self::ShellExtension(e) => format!("Install GNOME Shell extension {}", e.uuid),
        }
    }
}

/// A single declarative unit of desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique within a plan
    pub id: String,
    #[serde(flatten)]
    pub spec: ResourceSpec,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Alternatives tried in order when the primary spec fails to apply
    #[serde(default, rename = "fallback")]
    pub fallbacks: Vec<ResourceSpec>,
}

impl Resource {
    pub fn new(id: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            id: id.into(),
            spec,
            depends_on: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    /// Add a dependency on another resource id
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Append a fallback spec
    pub fn with_fallback(mut self, spec: ResourceSpec) -> Self {
        self.fallbacks.push(spec);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    pub fn description(&self) -> String {
        self.spec.description()
    }

    /// Primary spec followed by fallbacks
    pub fn specs(&self) -> impl Iterator<Item = &ResourceSpec> {
        std::iter::once(&self.spec).chain(self.fallbacks.iter())
    }
}
