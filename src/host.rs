//! Host facts detected once at plan construction
//!
//! The CPU vendor, Fedora release and architecture are available to plan
//! files as `${cpu_vendor}`, `${fedora}` and `${arch}`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::sync::OnceLock;

/// CPU vendor, as reported by `/proc/cpuinfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

impl CpuVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intel => "intel",
            Self::Amd => "amd",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the `vendor_id` line of `/proc/cpuinfo`
    pub fn from_cpuinfo(cpuinfo: &str) -> Self {
        let vendor = cpuinfo
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim() == "vendor_id")
            .map(|(_, v)| v.trim());
        match vendor {
            Some("GenuineIntel") => Self::Intel,
            Some("AuthenticAMD") => Self::Amd,
            _ => Self::Unknown,
        }
    }

    pub fn detect() -> Self {
        match fs::read_to_string("/proc/cpuinfo") {
            Ok(text) => Self::from_cpuinfo(&text),
            Err(e) => {
                log::debug!("Could not read /proc/cpuinfo: {e}");
                Self::Unknown
            }
        }
    }
}

impl fmt::Display for CpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CpuVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intel" => Ok(Self::Intel),
            "amd" => Ok(Self::Amd),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown CPU vendor `{other}` (expected intel or amd)")),
        }
    }
}

/// Facts about the machine being provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub cpu_vendor: CpuVendor,
    /// Fedora release number (`VERSION_ID`), if this is Fedora
    pub fedora: Option<String>,
    pub arch: String,
    pub is_root: bool,
}

impl HostFacts {
    pub fn detect() -> Self {
        let os_release = fs::read_to_string("/etc/os-release").unwrap_or_default();
        let facts = Self {
            cpu_vendor: CpuVendor::detect(),
            fedora: fedora_release(&os_release),
            arch: std::env::consts::ARCH.to_string(),
            is_root: is_root(),
        };
        log::debug!("Host facts: {facts:?}");
        facts
    }

    /// Value of a substitution variable, if it is a host fact
    pub fn var(&self, name: &str) -> Option<String> {
        match name {
            "cpu_vendor" => Some(self.cpu_vendor.to_string()),
            "fedora" => self.fedora.clone(),
            "arch" => Some(self.arch.clone()),
            _ => None,
        }
    }

    /// Replace `${cpu_vendor}`, `${fedora}` and `${arch}`; anything else
    /// (including dnf's `$releasever`/`$basearch`) is left as written
    pub fn substitute(&self, text: &str) -> String {
        if !text.contains('$') {
            return text.to_string();
        }
        shellexpand::env_with_context_no_errors(text, |name| self.var(name)).into_owned()
    }
}

/// `VERSION_ID` from os-release, only when `ID=fedora`
pub fn fedora_release(os_release: &str) -> Option<String> {
    static FIELD: OnceLock<Option<Regex>> = OnceLock::new();
    let re = FIELD
        .get_or_init(|| Regex::new(r#"(?m)^(ID|VERSION_ID)="?([^"\n]*)"?$"#).ok())
        .as_ref()?;

    let mut id = None;
    let mut version = None;
    for caps in re.captures_iter(os_release) {
        match &caps[1] {
            "ID" => id = Some(caps[2].to_string()),
            _ => version = Some(caps[2].to_string()),
        }
    }
    (id.as_deref() == Some("fedora")).then_some(version).flatten()
}

/// Whether the process runs with effective uid 0
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    #[allow(unsafe_code)]
    let euid = unsafe { libc::geteuid() };
    euid == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> HostFacts {
        HostFacts {
            cpu_vendor: CpuVendor::Amd,
            fedora: Some("41".into()),
            arch: "x86_64".into(),
            is_root: false,
        }
    }

    #[test]
    fn test_cpu_vendor_from_cpuinfo() {
        let intel = "processor\t: 0\nvendor_id\t: GenuineIntel\ncpu family\t: 6\n";
        let amd = "processor\t: 0\nvendor_id\t: AuthenticAMD\n";
        assert_eq!(CpuVendor::from_cpuinfo(intel), CpuVendor::Intel);
        assert_eq!(CpuVendor::from_cpuinfo(amd), CpuVendor::Amd);
        assert_eq!(CpuVendor::from_cpuinfo("processor : 0\n"), CpuVendor::Unknown);
    }

    #[test]
    fn test_cpu_vendor_from_str() {
        assert_eq!("Intel".parse::<CpuVendor>(), Ok(CpuVendor::Intel));
        assert_eq!("amd".parse::<CpuVendor>(), Ok(CpuVendor::Amd));
        assert!("arm".parse::<CpuVendor>().is_err());
    }

    #[test]
    fn test_fedora_release() {
        let fedora = "NAME=\"Fedora Linux\"\nVERSION=\"41 (Workstation Edition)\"\nID=fedora\nVERSION_ID=41\n";
        assert_eq!(fedora_release(fedora).as_deref(), Some("41"));

        let ubuntu = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"24.04\"\n";
        assert_eq!(fedora_release(ubuntu), None);
        assert_eq!(fedora_release(""), None);
    }

    #[test]
    fn test_substitute_host_vars() {
        let f = facts();
        assert_eq!(
            f.substitute("https://mirrors.rpmfusion.org/free/fedora/rpmfusion-free-release-${fedora}.noarch.rpm"),
            "https://mirrors.rpmfusion.org/free/fedora/rpmfusion-free-release-41.noarch.rpm"
        );
        assert_eq!(f.substitute("${cpu_vendor}-${arch}"), "amd-x86_64");
    }

    #[test]
    fn test_substitute_leaves_dnf_variables() {
        let f = facts();
        let line = "baseurl=https://download1.rpmfusion.org/free/fedora/releases/$releasever/Everything/$basearch/os/";
        assert_eq!(f.substitute(line), line);
        assert_eq!(f.substitute("no variables"), "no variables");
    }
}
