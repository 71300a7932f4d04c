use tracing::debug;

use super::record::{ExecutionRecord, RecordId};
use super::version::VersionRef;
use crate::errors::{Error, Result};

/// Default window for history listings.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Append-only log of execution records, keyed by version reference.
///
/// Individual records are never updated or deleted; cascade deletion through
/// the task repository is the only removal path.
#[derive(Debug, Default)]
pub struct HistoryLedger {
    records: Vec<ExecutionRecord>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        HistoryLedger {
            records: Vec::new(),
        }
    }

    /// Rebuilds a ledger from persisted records, preserving append order.
    pub fn from_records(records: Vec<ExecutionRecord>) -> Self {
        HistoryLedger { records }
    }

    /// Appends a record to the ledger.
    pub fn append(&mut self, record: ExecutionRecord) {
        debug!("recorded execution {} for {}", record.id, record.version);
        self.records.push(record);
    }

    /// The most recent records for a version, newest first, capped at
    /// `limit`.
    pub fn list_for_version(&self, version: VersionRef, limit: usize) -> Vec<&ExecutionRecord> {
        self.list_range(version, 0, limit)
    }

    /// Pages older history: skips the `offset` newest records for the
    /// version, then returns up to `limit` of the rest, newest first.
    pub fn list_range(
        &self,
        version: VersionRef,
        offset: usize,
        limit: usize,
    ) -> Vec<&ExecutionRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.version == version)
            .skip(offset)
            .take(limit)
            .collect()
    }

    pub fn get(&self, id: RecordId) -> Result<&ExecutionRecord> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("no execution record with id '{}'", id)))
    }

    /// Removes every record belonging to the given versions. Called only by
    /// cascade deletion of a task.
    pub fn remove_versions(&mut self, versions: &[VersionRef]) {
        let before = self.records.len();
        self.records.retain(|r| !versions.contains(&r.version));
        let removed = before - self.records.len();
        if removed > 0 {
            debug!("cascade removed {} execution records", removed);
        }
    }

    /// All records in append order, for persistence.
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Outcome;
    use crate::core::task::TaskId;
    use crate::core::version::VersionId;
    use chrono::Utc;
    use std::collections::HashMap;

    fn record(version: VersionRef, response: &str) -> ExecutionRecord {
        ExecutionRecord {
            id: RecordId::new(),
            version,
            executed_at: Utc::now(),
            inputs: HashMap::new(),
            rendered_prompt: "prompt".into(),
            model: "test-model".into(),
            outcome: Outcome::Success {
                response: response.into(),
                usage: None,
            },
        }
    }

    fn vref(task: TaskId, version: u32) -> VersionRef {
        VersionRef {
            task,
            version: VersionId(version),
        }
    }

    #[test]
    fn listing_is_newest_first_and_capped() {
        let mut ledger = HistoryLedger::new();
        let v = vref(TaskId::new(), 1);
        for i in 0..5 {
            ledger.append(record(v, &format!("r{}", i)));
        }

        let listed = ledger.list_for_version(v, 3);
        let responses: Vec<&str> = listed
            .iter()
            .filter_map(|r| r.outcome.response())
            .collect();
        assert_eq!(responses, vec!["r4", "r3", "r2"]);
    }

    #[test]
    fn paging_skips_newest() {
        let mut ledger = HistoryLedger::new();
        let v = vref(TaskId::new(), 1);
        for i in 0..5 {
            ledger.append(record(v, &format!("r{}", i)));
        }

        let older = ledger.list_range(v, 3, 10);
        let responses: Vec<&str> = older
            .iter()
            .filter_map(|r| r.outcome.response())
            .collect();
        assert_eq!(responses, vec!["r1", "r0"]);
    }

    #[test]
    fn listing_filters_by_version() {
        let mut ledger = HistoryLedger::new();
        let task = TaskId::new();
        ledger.append(record(vref(task, 1), "one"));
        ledger.append(record(vref(task, 2), "two"));

        let listed = ledger.list_for_version(vref(task, 2), DEFAULT_HISTORY_LIMIT);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].outcome.response(), Some("two"));
    }

    #[test]
    fn get_unknown_record_is_not_found() {
        let ledger = HistoryLedger::new();
        assert!(matches!(
            ledger.get(RecordId::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn cascade_removal_empties_the_version() {
        let mut ledger = HistoryLedger::new();
        let task = TaskId::new();
        let kept_task = TaskId::new();
        ledger.append(record(vref(task, 1), "gone"));
        ledger.append(record(vref(task, 2), "gone"));
        let kept = record(vref(kept_task, 1), "kept");
        let kept_id = kept.id;
        ledger.append(kept);

        ledger.remove_versions(&[vref(task, 1), vref(task, 2)]);

        assert!(ledger.list_for_version(vref(task, 1), 10).is_empty());
        assert!(ledger.list_for_version(vref(task, 2), 10).is_empty());
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(kept_id).is_ok());
    }
}
