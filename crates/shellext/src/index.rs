//! Extension index clients.
//!
//! [`GnomeExtensionsIndex`] talks to extensions.gnome.org. [`MockIndex`]
//! serves canned entries and archives for tests:
//!
//! ```
//! use shellext::index::{ExtensionIndex, MockIndex};
//! use shellext::ShellVersion;
//!
//! let index = MockIndex::new().with_extension("caffeine@patapon.info", "Caffeine", 517);
//! let hits = index.search("caffeine").unwrap();
//! assert_eq!(hits[0].pk, 517);
//! assert!(index.release(517, &ShellVersion::new(46)).is_ok());
//! ```

use crate::error::{Error, Result, Step};
use crate::types::{ExtensionEntry, ExtensionRelease, ShellVersion};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Maximum archive size; extensions are small.
const MAX_BODY_SIZE: u64 = 20 * 1024 * 1024;

const DEFAULT_BASE: &str = "https://extensions.gnome.org";

/// Source of extension metadata and archives.
pub trait ExtensionIndex: Send + Sync {
    /// Search by free text; hits in index order
    fn search(&self, term: &str) -> Result<Vec<ExtensionEntry>>;

    /// Resolve the release for a numeric id and shell version
    fn release(&self, pk: u64, shell: &ShellVersion) -> Result<ExtensionRelease>;

    /// Write the release archive to `dest`, returning its size
    fn download(&self, release: &ExtensionRelease, dest: &Path) -> Result<u64>;
}

/// extensions.gnome.org client.
pub struct GnomeExtensionsIndex {
    agent: ureq::Agent,
    base: String,
}

impl GnomeExtensionsIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(DEFAULT_BASE)
    }

    /// Use a different host (mirror, local test server).
    #[must_use]
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    fn search_url(&self) -> String {
        format!("{}/extension-query/", self.base)
    }

    fn info_url(&self) -> String {
        format!("{}/extension-info/", self.base)
    }

    /// Release download paths are host-relative
    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base, url.trim_start_matches('/'))
        }
    }
}

impl Default for GnomeExtensionsIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionIndex for GnomeExtensionsIndex {
    fn search(&self, term: &str) -> Result<Vec<ExtensionEntry>> {
        log::debug!("searching {} for {term:?}", self.base);
        let response: QueryResponse = self
            .agent
            .get(&self.search_url())
            .query("search", term)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| Error::from_http(Step::Lookup, e))?
            .body_mut()
            .read_json()
            .map_err(|e| Error::from_http(Step::Lookup, e))?;

        Ok(response.extensions.into_iter().map(Into::into).collect())
    }

    fn release(&self, pk: u64, shell: &ShellVersion) -> Result<ExtensionRelease> {
        let response: InfoResponse = self
            .agent
            .get(&self.info_url())
            .query("pk", pk.to_string())
            .query("shell_version", shell.query_value())
            .header("Accept", "application/json")
            .call()
            .map_err(|e| Error::from_http(Step::Resolve, e))?
            .body_mut()
            .read_json()
            .map_err(|e| Error::from_http(Step::Resolve, e))?;

        let download_url = response
            .download_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                Error::not_found(
                    Step::Resolve,
                    format!("no release of {} for GNOME Shell {}", response.uuid, shell),
                )
            })?;

        Ok(ExtensionRelease {
            uuid: response.uuid,
            pk: response.pk,
            version: response.version,
            download_url: self.absolute(&download_url),
        })
    }

    fn download(&self, release: &ExtensionRelease, dest: &Path) -> Result<u64> {
        log::debug!("downloading {}", release.download_url);
        let bytes = self
            .agent
            .get(&release.download_url)
            .call()
            .map_err(|e| Error::from_http(Step::Download, e))?
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| Error::from_http(Step::Download, e))?;

        fs::write(dest, &bytes).map_err(|e| Error::io(dest, e))?;
        Ok(bytes.len() as u64)
    }
}

// =============================================================================
// extensions.gnome.org response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    extensions: Vec<QueryHit>,
}

#[derive(Debug, Deserialize)]
struct QueryHit {
    uuid: String,
    #[serde(default)]
    name: String,
    pk: u64,
}

impl From<QueryHit> for ExtensionEntry {
    fn from(h: QueryHit) -> Self {
        Self {
            uuid: h.uuid,
            name: h.name,
            pk: h.pk,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    uuid: String,
    pk: u64,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    download_url: Option<String>,
}

/// In-memory index for tests.
#[derive(Debug, Clone, Default)]
pub struct MockIndex {
    entries: Vec<ExtensionEntry>,
    archives: Arc<Mutex<HashMap<u64, Vec<u8>>>>,
    /// Shell majors without a compatible release
    unsupported: Vec<u32>,
    offline: bool,
}

impl MockIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_extension(mut self, uuid: &str, name: &str, pk: u64) -> Self {
        self.entries.push(ExtensionEntry {
            uuid: uuid.to_string(),
            name: name.to_string(),
            pk,
        });
        self
    }

    /// Archive bytes served for a pk
    #[must_use]
    pub fn with_archive(self, pk: u64, bytes: Vec<u8>) -> Self {
        if let Ok(mut archives) = self.archives.lock() {
            archives.insert(pk, bytes);
        }
        self
    }

    #[must_use]
    pub fn without_release_for(mut self, major: u32) -> Self {
        self.unsupported.push(major);
        self
    }

    /// Every request fails as a transport error
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    fn check_online(&self, step: Step) -> Result<()> {
        if self.offline {
            return Err(Error::Http {
                step,
                message: "connection refused".to_string(),
                status: None,
            });
        }
        Ok(())
    }
}

impl ExtensionIndex for MockIndex {
    fn search(&self, term: &str) -> Result<Vec<ExtensionEntry>> {
        self.check_online(Step::Lookup)?;
        let term = term.to_lowercase();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.uuid.to_lowercase().contains(&term) || e.name.to_lowercase().contains(&term))
            .cloned()
            .collect())
    }

    fn release(&self, pk: u64, shell: &ShellVersion) -> Result<ExtensionRelease> {
        self.check_online(Step::Resolve)?;
        let entry = self
            .entries
            .iter()
            .find(|e| e.pk == pk)
            .ok_or_else(|| Error::not_found(Step::Resolve, format!("no extension with pk {pk}")))?;
        if self.unsupported.contains(&shell.major) {
            return Err(Error::not_found(
                Step::Resolve,
                format!("no release of {} for GNOME Shell {shell}", entry.uuid),
            ));
        }
        Ok(ExtensionRelease {
            uuid: entry.uuid.clone(),
            pk,
            version: Some(1),
            download_url: format!("mock://{pk}.zip"),
        })
    }

    fn download(&self, release: &ExtensionRelease, dest: &Path) -> Result<u64> {
        self.check_online(Step::Download)?;
        let bytes = self
            .archives
            .lock()
            .ok()
            .and_then(|a| a.get(&release.pk).cloned())
            .unwrap_or_default();
        fs::write(dest, &bytes).map_err(|e| Error::io(dest, e))?;
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let index = GnomeExtensionsIndex::new();
        assert_eq!(index.search_url(), "https://extensions.gnome.org/extension-query/");
        assert_eq!(index.info_url(), "https://extensions.gnome.org/extension-info/");
    }

    #[test]
    fn test_absolute_download_url() {
        let index = GnomeExtensionsIndex::with_base("https://mirror.example/");
        assert_eq!(index.base(), "https://mirror.example");
        assert_eq!(
            index.absolute("/download-extension/caffeine@patapon.info.shell-extension.zip?version_tag=60000"),
            "https://mirror.example/download-extension/caffeine@patapon.info.shell-extension.zip?version_tag=60000"
        );
        assert_eq!(index.absolute("https://cdn.example/x.zip"), "https://cdn.example/x.zip");
    }

    #[test]
    fn test_query_response_parsing() {
        let json = r#"{"extensions":[{"uuid":"dash-to-dock@micxgx.gmail.com","name":"Dash to Dock","creator":"michele_g","pk":307,"shell_version_map":{}}],"total":1,"numpages":1}"#;
        let response: QueryResponse = serde_json::from_str(json).unwrap();
        let entries: Vec<ExtensionEntry> = response.extensions.into_iter().map(Into::into).collect();
        assert_eq!(entries[0].pk, 307);
        assert_eq!(entries[0].uuid, "dash-to-dock@micxgx.gmail.com");
    }

    #[test]
    fn test_info_response_without_download() {
        let json = r#"{"uuid":"dash-to-dock@micxgx.gmail.com","pk":307,"name":"Dash to Dock"}"#;
        let response: InfoResponse = serde_json::from_str(json).unwrap();
        assert!(response.download_url.is_none());
    }

    #[test]
    fn test_mock_index_search_and_release() {
        let index = MockIndex::new()
            .with_extension("blur-my-shell@aunetx", "Blur my Shell", 3193)
            .without_release_for(40);
        assert_eq!(index.search("blur").unwrap().len(), 1);
        assert!(index.search("nothing").unwrap().is_empty());
        assert!(index.release(3193, &ShellVersion::new(46)).is_ok());
        assert!(index.release(3193, &ShellVersion::new(40)).is_err());
    }

    #[test]
    fn test_mock_index_offline() {
        let err = MockIndex::new().offline().search("x").unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Network);
    }
}
