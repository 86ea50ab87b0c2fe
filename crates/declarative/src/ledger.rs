//! Append-only run ledger and its persistence seam

use crate::types::{Outcome, RunSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;

/// Identity of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHeader {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Number of resources in the plan
    pub resources: usize,
    #[serde(default)]
    pub dry_run: bool,
}

impl RunHeader {
    pub fn new(resources: usize, dry_run: bool) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string(),
            started_at,
            resources,
            dry_run,
        }
    }
}

/// Ordered outcomes of one run
///
/// Outcomes can only be appended, and at most one per resource id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    header: RunHeader,
    outcomes: Vec<Outcome>,
}

impl Ledger {
    pub fn new(header: RunHeader) -> Self {
        Self {
            header,
            outcomes: Vec::new(),
        }
    }

    pub fn header(&self) -> &RunHeader {
        &self.header
    }

    /// Append an outcome; returns false if the resource already has one
    pub fn record(&mut self, outcome: Outcome) -> bool {
        if self.get(&outcome.resource_id).is_some() {
            log::warn!(
                "ignoring second outcome for `{}` in run {}",
                outcome.resource_id,
                self.header.run_id
            );
            return false;
        }
        self.outcomes.push(outcome);
        true
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn get(&self, resource_id: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.resource_id == resource_id)
    }

    /// Position of a resource's outcome in recording order
    pub fn position(&self, resource_id: &str) -> Option<usize> {
        self.outcomes
            .iter()
            .position(|o| o.resource_id == resource_id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Rebuild a ledger from persisted records
    ///
    /// Returns `None` when the records contain no run header.
    pub fn from_records(
        records: impl IntoIterator<Item = LedgerRecord>,
    ) -> Option<(Self, Option<RunSummary>)> {
        let mut ledger: Option<Self> = None;
        let mut summary = None;
        for record in records {
            match record {
                LedgerRecord::Run(header) => ledger = Some(Self::new(header)),
                LedgerRecord::Outcome(outcome) => {
                    if let Some(l) = ledger.as_mut() {
                        l.record(outcome);
                    }
                }
                LedgerRecord::Summary(s) => summary = Some(s),
            }
        }
        ledger.map(|l| (l, summary))
    }
}

/// One persisted line of a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LedgerRecord {
    Run(RunHeader),
    Outcome(Outcome),
    Summary(RunSummary),
}

/// Durable storage for ledgers
///
/// `append` is called as each outcome is recorded, before any dependent
/// resource starts, so a crashed run still leaves an accurate prefix.
pub trait LedgerStore {
    fn begin(&mut self, header: &RunHeader) -> io::Result<()>;
    fn append(&mut self, outcome: &Outcome) -> io::Result<()>;
    fn finish(&mut self, summary: &RunSummary) -> io::Result<()>;
}

/// In-memory store, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub records: Vec<LedgerRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn begin(&mut self, header: &RunHeader) -> io::Result<()> {
        self.records.push(LedgerRecord::Run(header.clone()));
        Ok(())
    }

    fn append(&mut self, outcome: &Outcome) -> io::Result<()> {
        self.records.push(LedgerRecord::Outcome(outcome.clone()));
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        self.records.push(LedgerRecord::Summary(summary.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{GSettingSpec, Resource, ResourceSpec};

    fn outcome(id: &str) -> Outcome {
        let resource = Resource::new(
            id,
            ResourceSpec::GSetting(GSettingSpec {
                schema: "org.gnome.mutter".into(),
                key: "center-new-windows".into(),
                value: "true".into(),
            }),
        );
        Outcome::applied(&resource, None, Vec::new())
    }

    #[test]
    fn test_record_is_append_only_per_resource() {
        let mut ledger = Ledger::new(RunHeader::new(2, false));
        assert!(ledger.record(outcome("a")));
        assert!(!ledger.record(outcome("a")));
        assert!(ledger.record(outcome("b")));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.position("b"), Some(1));
    }

    #[test]
    fn test_records_roundtrip_through_json_lines() {
        let header = RunHeader::new(1, false);
        let mut store = MemoryStore::new();
        store.begin(&header).unwrap();
        store.append(&outcome("a")).unwrap();
        store
            .finish(&RunSummary {
                applied: 1,
                ..RunSummary::default()
            })
            .unwrap();

        let lines: Vec<String> = store
            .records
            .iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect();
        assert!(lines[0].contains("\"record\":\"run\""));

        let parsed = lines
            .iter()
            .map(|l| serde_json::from_str::<LedgerRecord>(l).unwrap());
        let (ledger, summary) = Ledger::from_records(parsed).unwrap();
        assert_eq!(ledger.header(), &header);
        assert_eq!(ledger.outcomes()[0].resource_id, "a");
        assert_eq!(summary.unwrap().applied, 1);
    }

    #[test]
    fn test_from_records_without_header() {
        assert!(Ledger::from_records(vec![LedgerRecord::Outcome(outcome("a"))]).is_none());
    }
}
