//! Lookup → resolve → download → install pipeline.

use crate::error::{Error, Result, Step};
use crate::index::ExtensionIndex;
use crate::shell::ShellTool;
use crate::types::{ExtensionEntry, ExtensionState, InstallReport};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Installs extensions from an index through the local shell tooling.
///
/// Each install gets its own scratch directory under `scratch_root`. The
/// directory is a [`tempfile::TempDir`], so it is removed when the install
/// returns, whether it succeeded or failed at any step.
pub struct Installer {
    index: Box<dyn ExtensionIndex>,
    shell: Box<dyn ShellTool>,
    scratch_root: PathBuf,
}

impl Installer {
    pub fn new(
        index: Box<dyn ExtensionIndex>,
        shell: Box<dyn ShellTool>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            shell,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Local state of an extension
    pub fn status(&self, uuid: &str) -> Result<Option<ExtensionState>> {
        self.shell.info(uuid)
    }

    /// Find the index entry whose uuid matches exactly
    pub fn lookup(&self, uuid: &str, term: &str) -> Result<ExtensionEntry> {
        let hits = self.index.search(term)?;
        log::debug!("{} hits for {term:?}", hits.len());
        hits.into_iter().find(|e| e.uuid == uuid).ok_or_else(|| {
            Error::not_found(Step::Lookup, format!("no extension {uuid} matching {term:?}"))
        })
    }

    /// Resolve, download, verify, install and optionally enable
    pub fn install(&self, uuid: &str, term: &str, enable: bool) -> Result<InstallReport> {
        let shell_version = self.shell.shell_version()?;
        let entry = self.lookup(uuid, term)?;
        let release = self.index.release(entry.pk, &shell_version)?;
        if release.download_url.is_empty() {
            return Err(Error::not_found(
                Step::Resolve,
                format!("no download location for {uuid}"),
            ));
        }

        fs::create_dir_all(&self.scratch_root).map_err(|e| Error::io(&self.scratch_root, e))?;
        let scratch = tempfile::Builder::new()
            .prefix("ext-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| Error::io(&self.scratch_root, e))?;
        let archive = scratch.path().join(format!("{uuid}.zip"));

        let size = self.index.download(&release, &archive)?;
        if size == 0 {
            return Err(Error::not_found(
                Step::Download,
                format!("empty archive for {uuid}"),
            ));
        }
        verify_archive(&archive, uuid)?;

        self.shell.install(&archive)?;
        if enable {
            self.shell.enable(uuid)?;
        }
        log::info!(
            "installed {uuid} (pk {}, version {:?}) for GNOME Shell {shell_version}",
            entry.pk,
            release.version
        );

        Ok(InstallReport {
            uuid: uuid.to_string(),
            pk: entry.pk,
            version: release.version,
            shell_version,
            enabled: enable,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    uuid: String,
}

/// Check that the archive's `metadata.json` declares `uuid`
pub fn verify_archive(path: &Path, uuid: &str) -> Result<()> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive.by_name("metadata.json")?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| Error::io(path, e))?;
    let metadata: Metadata = serde_json::from_str(&text)
        .map_err(|e| Error::Archive(format!("metadata.json: {e}")))?;
    if metadata.uuid == uuid {
        Ok(())
    } else {
        Err(Error::UuidMismatch {
            expected: uuid.to_string(),
            found: metadata.uuid,
        })
    }
}
