//! Repository file resource - exact-content files such as yum repo definitions
//!
//! Writes are atomic: the new content goes to a temporary file in the target
//! directory, which is then renamed over the target. An existing file with
//! different content is first copied to `<path>.<timestamp>.bak`.

use chrono::Utc;
use declarative::{
    ApplyContext, ApplyError, Provider, QueryState, RepoFileSpec, ResourceKind, ResourceSpec,
};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::unsupported;

const DEFAULT_MODE: u32 = 0o644;

#[derive(Debug, Default)]
pub struct RepoFileProvider {
    is_root: bool,
}

impl RepoFileProvider {
    pub fn new(is_root: bool) -> Self {
        Self { is_root }
    }
}

/// Path of the backup taken before overwriting `path`
pub fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{stamp}.bak"));
    PathBuf::from(name)
}

/// Current state of the file against the spec
pub fn check(spec: &RepoFileSpec) -> QueryState {
    let current = match fs::read_to_string(&spec.path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return QueryState::Unsatisfied,
        Err(e) => {
            log::debug!("{}: {e}", spec.path.display());
            return QueryState::Unknown;
        }
    };
    if current != spec.content {
        return QueryState::Unsatisfied;
    }
    match (spec.mode, fs::metadata(&spec.path)) {
        (Some(mode), Ok(meta)) if meta.permissions().mode() & 0o7777 != mode => {
            QueryState::Unsatisfied
        }
        _ => QueryState::Satisfied,
    }
}

/// Changed lines between the file on disk and the declared content
///
/// A missing file diffs against empty content.
pub fn diff(spec: &RepoFileSpec) -> Vec<(ChangeTag, String)> {
    let current = fs::read_to_string(&spec.path).unwrap_or_default();
    TextDiff::from_lines(current.as_str(), spec.content.as_str())
        .iter_all_changes()
        .filter(|c| c.tag() != ChangeTag::Equal)
        .map(|c| (c.tag(), c.value().trim_end_matches('\n').to_string()))
        .collect()
}

/// Write as the current user; `PermissionDenied` means sudo is needed
fn write_direct(spec: &RepoFileSpec) -> io::Result<()> {
    let dir = spec
        .path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(spec.content.as_bytes())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(
        tmp.path(),
        fs::Permissions::from_mode(spec.mode.unwrap_or(DEFAULT_MODE)),
    )?;

    if spec.path.exists() {
        let backup = backup_path(&spec.path);
        fs::copy(&spec.path, &backup)?;
        log::info!("backed up {} to {}", spec.path.display(), backup.display());
    }
    tmp.persist(&spec.path).map_err(|e| e.error)?;
    Ok(())
}

/// Same steps as [`write_direct`], each run through sudo
fn write_privileged(spec: &RepoFileSpec, ctx: &ApplyContext) -> Result<(), ApplyError> {
    let dir = spec
        .path
        .parent()
        .ok_or_else(|| ApplyError::tool_failed(format!("{} has no parent", spec.path.display())))?;
    let target = spec.path.to_string_lossy().to_string();
    let dir_str = dir.to_string_lossy().to_string();

    // Staged locally, then copied next to the target so the final mv is a rename
    let mut staged = NamedTempFile::new().map_err(|e| ApplyError::from_io("staging file", &e))?;
    staged
        .write_all(spec.content.as_bytes())
        .map_err(|e| ApplyError::from_io("staging file", &e))?;
    let staged_path = staged.path().to_string_lossy().to_string();

    let name = spec
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_target = dir.join(format!(".{name}.choro-tmp")).to_string_lossy().to_string();
    let mode = format!("{:o}", spec.mode.unwrap_or(DEFAULT_MODE));

    let run = |cmd: &str, args: &[&str]| -> Result<(), ApplyError> {
        let output = ctx.run_privileged(cmd, args)?;
        if output.success {
            Ok(())
        } else {
            Err(ApplyError::from_output(cmd, &output))
        }
    };

    run("mkdir", &["-p", &dir_str])?;
    if spec.path.exists() {
        let backup = backup_path(&spec.path).to_string_lossy().to_string();
        run("cp", &["-p", &target, &backup])?;
        log::info!("backed up {target} to {backup}");
    }
    run("install", &["-m", &mode, &staged_path, &tmp_target])?;
    run("mv", &["-f", &tmp_target, &target])
}

impl Provider for RepoFileProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RepoFile
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        match spec {
            ResourceSpec::RepoFile(f) => check(f),
            _ => QueryState::Unknown,
        }
    }

    fn apply(&self, spec: &ResourceSpec, ctx: &ApplyContext) -> Result<(), ApplyError> {
        let ResourceSpec::RepoFile(f) = spec else {
            return Err(unsupported(self.kind(), spec));
        };
        match write_direct(f) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                log::debug!("{} not writable, using sudo", f.path.display());
                write_privileged(f, ctx)
            }
            Err(e) => Err(ApplyError::from_io(&format!("write {}", f.path.display()), &e)),
        }
    }

    /// Files outside the user's home need root
    fn requires_privilege(&self, spec: &ResourceSpec) -> bool {
        let ResourceSpec::RepoFile(f) = spec else {
            return false;
        };
        !self.is_root && !dirs::home_dir().is_some_and(|home| f.path.starts_with(home))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::RecordingSudo;
    use declarative::ErrorKind;
    use std::sync::Arc;

    const REPO: &str = "[rpmfusion-free]\nname=RPM Fusion for Fedora $releasever - Free\nenabled=1\n";

    fn spec(path: PathBuf) -> RepoFileSpec {
        RepoFileSpec {
            path,
            content: REPO.to_string(),
            mode: None,
        }
    }

    fn backups(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".bak"))
            .collect()
    }

    #[test]
    fn test_missing_file_is_written() {
        let temp = tempfile::tempdir().unwrap();
        let spec = spec(temp.path().join("yum.repos.d").join("rpmfusion-free.repo"));
        assert_eq!(check(&spec), QueryState::Unsatisfied);

        write_direct(&spec).unwrap();
        assert_eq!(fs::read_to_string(&spec.path).unwrap(), REPO);
        assert_eq!(check(&spec), QueryState::Satisfied);
        assert!(backups(spec.path.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_changed_file_is_backed_up() {
        let temp = tempfile::tempdir().unwrap();
        let spec = spec(temp.path().join("rpmfusion-free.repo"));
        fs::write(&spec.path, "[rpmfusion-free]\nenabled=0\n").unwrap();
        assert_eq!(check(&spec), QueryState::Unsatisfied);

        write_direct(&spec).unwrap();
        let backups = backups(temp.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(&backups[0]).unwrap(),
            "[rpmfusion-free]\nenabled=0\n"
        );
        assert_eq!(fs::read_to_string(&spec.path).unwrap(), REPO);
    }

    #[test]
    fn test_mode_is_part_of_state() {
        let temp = tempfile::tempdir().unwrap();
        let mut spec = spec(temp.path().join("sudoers-choro"));
        spec.mode = Some(0o440);
        write_direct(&spec).unwrap();
        let mode = fs::metadata(&spec.path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o440);
        assert_eq!(check(&spec), QueryState::Satisfied);

        fs::set_permissions(&spec.path, fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(check(&spec), QueryState::Unsatisfied);
    }

    #[test]
    fn test_diff_lists_changed_lines() {
        let temp = tempfile::tempdir().unwrap();
        let spec = spec(temp.path().join("x.repo"));
        fs::write(&spec.path, "[rpmfusion-free]\nenabled=0\n").unwrap();
        let changes = diff(&spec);
        assert!(changes.contains(&(ChangeTag::Delete, "enabled=0".to_string())));
        assert!(changes.contains(&(ChangeTag::Insert, "enabled=1".to_string())));
        assert!(!changes.iter().any(|(_, l)| l == "[rpmfusion-free]"));
    }

    #[test]
    fn test_privileged_write_commands() {
        let sudo = Arc::new(RecordingSudo::default());
        let ctx = ApplyContext::with_sudo(false, sudo.clone());
        let spec = spec(PathBuf::from("/nonexistent-choro/yum.repos.d/x.repo"));
        write_privileged(&spec, &ctx).unwrap();

        let calls = sudo.calls();
        assert_eq!(calls[0], "mkdir -p /nonexistent-choro/yum.repos.d");
        assert!(calls[1].starts_with("install -m 644 "));
        assert!(calls[1].ends_with(" /nonexistent-choro/yum.repos.d/.x.repo.choro-tmp"));
        assert_eq!(
            calls[2],
            "mv -f /nonexistent-choro/yum.repos.d/.x.repo.choro-tmp /nonexistent-choro/yum.repos.d/x.repo"
        );
    }

    #[test]
    fn test_privileged_write_without_sudo() {
        let spec = spec(PathBuf::from("/nonexistent-choro/x.repo"));
        let err = write_privileged(&spec, &ApplyContext::new(false)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_privilege_outside_home() {
        let provider = RepoFileProvider::new(false);
        let system = ResourceSpec::RepoFile(spec(PathBuf::from("/etc/yum.repos.d/x.repo")));
        assert!(provider.requires_privilege(&system));
        assert!(!RepoFileProvider::new(true).requires_privilege(&system));
        if let Some(home) = dirs::home_dir() {
            let user = ResourceSpec::RepoFile(spec(home.join(".config/environment.d/x.conf")));
            assert!(!provider.requires_privilege(&user));
        }
    }

    #[test]
    fn test_backup_path_keeps_name() {
        let backup = backup_path(Path::new("/etc/yum.repos.d/x.repo"));
        let name = backup.to_string_lossy();
        assert!(name.starts_with("/etc/yum.repos.d/x.repo."));
        assert!(name.ends_with(".bak"));
    }
}
