//! Persisted run ledgers
//!
//! Each run is one JSON Lines file under the ledger directory, named after
//! the run id: a `run` header, one `outcome` line per resource as it is
//! recorded, and a closing `summary`. Every line is flushed and synced
//! before the engine moves on, so an interrupted run leaves a valid prefix.

use anyhow::{Context, Result};
use declarative::{Ledger, LedgerRecord, LedgerStore, Outcome, RunHeader, RunSummary};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXTENSION: &str = "jsonl";

/// JSON Lines ledger store
pub struct FileLedgerStore {
    dir: PathBuf,
    file: Option<File>,
    path: Option<PathBuf>,
}

impl FileLedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: None,
            path: None,
        }
    }

    /// File of the current run, once begun
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn write(&mut self, record: &LedgerRecord) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("ledger run not started"))?;
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.sync_data()
    }
}

impl LedgerStore for FileLedgerStore {
    fn begin(&mut self, header: &RunHeader) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.{EXTENSION}", header.run_id));
        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;
        log::debug!("Recording run {} in {}", header.run_id, path.display());
        self.file = Some(file);
        self.path = Some(path);
        self.write(&LedgerRecord::Run(header.clone()))
    }

    fn append(&mut self, outcome: &Outcome) -> io::Result<()> {
        self.write(&LedgerRecord::Outcome(outcome.clone()))
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        self.write(&LedgerRecord::Summary(summary.clone()))?;
        self.file = None;
        Ok(())
    }
}

/// A run read back from disk
#[derive(Debug)]
pub struct StoredRun {
    pub path: PathBuf,
    pub ledger: Ledger,
    /// Absent when the run was interrupted before finishing
    pub summary: Option<RunSummary>,
}

/// Run ids in the ledger directory, oldest first
pub fn list_runs(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|x| x == EXTENSION))
        .filter_map(|e| e.path().file_stem().map(|s| s.to_string_lossy().to_string()))
        .collect();
    // Run ids are UTC timestamps, so lexical order is chronological
    ids.sort();
    Ok(ids)
}

/// Load one run by id, or the latest run
pub fn load_run(dir: &Path, run_id: Option<&str>) -> Result<Option<StoredRun>> {
    let id = match run_id {
        Some(id) => id.to_string(),
        None => match list_runs(dir)?.pop() {
            Some(id) => id,
            None => return Ok(None),
        },
    };
    let path = dir.join(format!("{id}.{EXTENSION}"));
    let file = File::open(&path)
        .with_context(|| format!("No ledger for run {id} at {}", path.display()))?;

    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LedgerRecord>(&line) {
            Ok(record) => records.push(record),
            // A torn final line from a crash; keep the valid prefix
            Err(e) => log::warn!("{}:{}: skipping unreadable record: {e}", path.display(), n + 1),
        }
    }

    let (ledger, summary) = Ledger::from_records(records)
        .with_context(|| format!("{} has no run header", path.display()))?;
    Ok(Some(StoredRun {
        path,
        ledger,
        summary,
    }))
}
