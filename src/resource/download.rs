//! Download resource - fetch an artifact, verify it, optionally run it
//!
//! Each apply downloads into its own scratch directory, which is removed
//! when the apply returns on every path.

use declarative::{
    ApplyContext, ApplyError, DownloadSpec, Provider, QueryState, ResourceKind, ResourceSpec,
};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{substitute_path, unsupported};

pub struct DownloadProvider {
    agent: ureq::Agent,
    scratch_root: PathBuf,
}

impl DownloadProvider {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            scratch_root: scratch_root.into(),
        }
    }

    /// Download `url` into `path`, returning the byte count
    fn fetch(&self, url: &str, path: &Path) -> Result<u64, ApplyError> {
        log::info!("downloading {url}");
        let mut response = self.agent.get(url).call().map_err(|e| http_error(url, e))?;
        let mut file = File::create(path)
            .map_err(|e| ApplyError::from_io(&format!("create {}", path.display()), &e))?;
        io::copy(&mut response.body_mut().as_reader(), &mut file)
            .map_err(|e| ApplyError::network(format!("{url}: {e}")))
    }
}

fn http_error(url: &str, err: ureq::Error) -> ApplyError {
    match err {
        ureq::Error::StatusCode(code @ (404 | 410)) => {
            ApplyError::not_found(format!("{url} returned HTTP {code}"))
        }
        ureq::Error::StatusCode(code) if code >= 500 => {
            ApplyError::network(format!("{url} returned HTTP {code}"))
        }
        ureq::Error::StatusCode(code) => ApplyError::tool_failed(format!("{url} returned HTTP {code}")),
        other => ApplyError::network(format!("{url}: {other}")),
    }
}

/// blake3 digest of a file, lowercase hex
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(File::open(path)?)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn digest_matches(path: &Path, expected: &str) -> io::Result<bool> {
    Ok(file_digest(path)?.eq_ignore_ascii_case(expected.trim()))
}

/// Whether the artifact (and its run step) is already in place
pub fn check(spec: &DownloadSpec) -> QueryState {
    if let Some(marker) = &spec.creates {
        return if marker.exists() {
            QueryState::Satisfied
        } else {
            QueryState::Unsatisfied
        };
    }
    if !spec.dest.exists() {
        return QueryState::Unsatisfied;
    }
    match &spec.blake3 {
        None => QueryState::Satisfied,
        Some(expected) => match digest_matches(&spec.dest, expected) {
            Ok(true) => QueryState::Satisfied,
            Ok(false) => QueryState::Unsatisfied,
            Err(e) => {
                log::debug!("{}: {e}", spec.dest.display());
                QueryState::Unknown
            }
        },
    }
}

/// Verify a downloaded file, move it to `dest` and run the post step
pub fn install_staged(spec: &DownloadSpec, staged: &Path) -> Result<(), ApplyError> {
    if let Some(expected) = &spec.blake3 {
        let actual = file_digest(staged).map_err(|e| ApplyError::from_io("hash download", &e))?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(ApplyError::tool_failed(format!(
                "blake3 mismatch for {}: expected {expected}, got {actual}",
                spec.url
            )));
        }
    }

    let dest = &spec.dest;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ApplyError::from_io(&format!("create {}", parent.display()), &e))?;
    }
    // Scratch may be on another filesystem
    if fs::rename(staged, dest).is_err() {
        fs::copy(staged, dest)
            .map_err(|e| ApplyError::from_io(&format!("install {}", dest.display()), &e))?;
    }
    if let Some(mode) = spec.mode {
        fs::set_permissions(dest, fs::Permissions::from_mode(mode))
            .map_err(|e| ApplyError::from_io(&format!("chmod {}", dest.display()), &e))?;
    }

    let Some(run) = &spec.run else {
        return Ok(());
    };
    run_step(run, dest).inspect_err(|_| {
        // A dest left behind would read as satisfied on the next query
        if let Err(e) = fs::remove_file(dest) {
            log::warn!("could not remove {}: {e}", dest.display());
        }
    })
}

fn run_step(run: &[String], dest: &Path) -> Result<(), ApplyError> {
    let args = substitute_path(run, &dest.to_string_lossy());
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };
    log::info!("running {}", args.join(" "));
    let mut cmd = Command::new(program);
    cmd.args(rest);
    if let Some(dir) = dest.parent() {
        cmd.current_dir(dir);
    }
    let output = cmd.output().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ApplyError::tool_failed(format!("{program} not found")),
        _ => ApplyError::from_io(program, &e),
    })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(ApplyError::from_output(program, &output.into()))
    }
}

impl Provider for DownloadProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Download
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        match spec {
            ResourceSpec::Download(d) => check(d),
            _ => QueryState::Unknown,
        }
    }

    fn apply(&self, spec: &ResourceSpec, _ctx: &ApplyContext) -> Result<(), ApplyError> {
        let ResourceSpec::Download(d) = spec else {
            return Err(unsupported(self.kind(), spec));
        };
        fs::create_dir_all(&self.scratch_root).map_err(|e| {
            ApplyError::from_io(&format!("create {}", self.scratch_root.display()), &e)
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("dl-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| ApplyError::from_io("create scratch directory", &e))?;

        let name = d
            .dest
            .file_name()
            .map_or_else(|| "download".into(), |n| n.to_os_string());
        let staged = scratch.path().join(name);
        let size = self.fetch(&d.url, &staged)?;
        log::debug!("fetched {} from {}", crate::ui::format_size(size), d.url);
        if size == 0 {
            return Err(ApplyError::not_found(format!("{} returned an empty body", d.url)));
        }
        install_staged(d, &staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ErrorKind;

    const INSTALLER: &[u8] = b"#!/bin/sh\ntouch \"$1.done\"\n";

    fn spec(dest: PathBuf) -> DownloadSpec {
        DownloadSpec {
            url: "https://example.org/install.sh".into(),
            dest,
            blake3: None,
            mode: None,
            run: None,
            creates: None,
        }
    }

    fn staged(dir: &Path) -> PathBuf {
        let path = dir.join("staged");
        fs::write(&path, INSTALLER).unwrap();
        path
    }

    #[test]
    fn test_install_verifies_digest() {
        let temp = tempfile::tempdir().unwrap();
        let digest = blake3::hash(INSTALLER).to_hex().to_string();
        let mut spec = spec(temp.path().join("bin").join("install.sh"));
        spec.blake3 = Some(digest.to_uppercase());
        spec.mode = Some(0o755);

        assert_eq!(check(&spec), QueryState::Unsatisfied);
        install_staged(&spec, &staged(temp.path())).unwrap();
        assert_eq!(fs::read(&spec.dest).unwrap(), INSTALLER);
        let mode = fs::metadata(&spec.dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        assert_eq!(check(&spec), QueryState::Satisfied);
    }

    #[test]
    fn test_digest_mismatch_leaves_dest_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let mut spec = spec(temp.path().join("install.sh"));
        spec.blake3 = Some("00".repeat(32));
        let err = install_staged(&spec, &staged(temp.path())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExternalToolFailed);
        assert!(err.detail.contains("blake3 mismatch"));
        assert!(!spec.dest.exists());
    }

    #[test]
    fn test_run_step_substitutes_path() {
        let temp = tempfile::tempdir().unwrap();
        let mut spec = spec(temp.path().join("install.sh"));
        spec.run = Some(vec!["sh".into(), "{path}".into(), "{path}".into()]);
        spec.creates = Some(temp.path().join("install.sh.done"));

        assert_eq!(check(&spec), QueryState::Unsatisfied);
        install_staged(&spec, &staged(temp.path())).unwrap();
        assert_eq!(check(&spec), QueryState::Satisfied);
    }

    #[test]
    fn test_failed_run_step() {
        let temp = tempfile::tempdir().unwrap();
        let mut spec = spec(temp.path().join("install.sh"));
        spec.run = Some(vec!["sh".into(), "-c".into(), "echo boom >&2; exit 3".into()]);
        let err = install_staged(&spec, &staged(temp.path())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExternalToolFailed);
        assert!(err.detail.contains("boom"));
    }

    #[test]
    fn test_failed_run_step_leaves_resource_unsatisfied() {
        let temp = tempfile::tempdir().unwrap();
        let mut spec = spec(temp.path().join("install.sh"));
        spec.creates = None;
        spec.run = Some(vec!["sh".into(), "-c".into(), "exit 3".into()]);
        install_staged(&spec, &staged(temp.path())).unwrap_err();

        assert!(!spec.dest.exists());
        assert_eq!(check(&spec), QueryState::Unsatisfied);
    }

    #[test]
    fn test_unreachable_url_cleans_scratch() {
        let temp = tempfile::tempdir().unwrap();
        let scratch = temp.path().join("scratch");
        let provider = DownloadProvider::new(&scratch);
        let mut spec = spec(temp.path().join("install.sh"));
        spec.url = "http://127.0.0.1:9/install.sh".into();

        let err = provider
            .apply(&ResourceSpec::Download(spec), &ApplyContext::new(false))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkUnavailable);
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_http_status_mapping() {
        let url = "https://example.org/x";
        assert_eq!(http_error(url, ureq::Error::StatusCode(404)).kind, ErrorKind::NotFound);
        assert_eq!(
            http_error(url, ureq::Error::StatusCode(503)).kind,
            ErrorKind::NetworkUnavailable
        );
        assert_eq!(
            http_error(url, ureq::Error::StatusCode(403)).kind,
            ErrorKind::ExternalToolFailed
        );
    }
}
