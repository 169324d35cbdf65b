//! Before/after images of every target write in a run.
//!
//! Both migration writes and fix writes go through the journal, so a single
//! replay undoes the whole run.

use crate::error::StoreError;
use crate::record::Record;
use crate::target::TargetStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which component issued a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOrigin {
    Migration,
    Fix,
}

/// One committed target write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the run, starting at 0.
    pub seq: u64,
    /// Table written.
    pub table: String,
    /// Record written or deleted.
    pub record_id: String,
    /// Target image before the write; `None` if the record did not exist.
    pub before: Option<Record>,
    /// Target image after the write; `None` for deletes.
    pub after: Option<Record>,
    /// Issuer.
    pub origin: WriteOrigin,
}

/// Outcome of replaying a journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Records put back to their earlier image.
    pub restored: usize,
    /// Records removed because they did not exist before the run.
    pub removed: usize,
    /// `table/id` of records that could not be restored.
    pub unrestored: Vec<String>,
    /// Failure messages, one per unrestored record.
    pub errors: Vec<String>,
}

impl RollbackReport {
    /// Whether every record was restored.
    pub fn is_complete(&self) -> bool {
        self.unrestored.is_empty()
    }
}

/// Write journal for one run.
#[derive(Debug, Default)]
pub struct RunJournal {
    entries: Vec<JournalEntry>,
}

impl RunJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in write order.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Number of committed writes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Save a record, capturing its previous image first.
    pub fn save(
        &mut self,
        target: &dyn TargetStore,
        table: &str,
        record: &Record,
        origin: WriteOrigin,
    ) -> Result<(), StoreError> {
        let before = target.get(table, &record.id)?;
        target.save(table, record)?;
        self.push(table, &record.id, before, Some(record.clone()), origin);
        Ok(())
    }

    /// Delete a record, capturing its previous image first.
    ///
    /// Returns whether the record existed. Nothing is journaled when it did not.
    pub fn delete(
        &mut self,
        target: &dyn TargetStore,
        table: &str,
        id: &str,
        origin: WriteOrigin,
    ) -> Result<bool, StoreError> {
        let Some(before) = target.get(table, id)? else {
            return Ok(false);
        };
        let existed = target.delete(table, id)?;
        self.push(table, id, Some(before), None, origin);
        Ok(existed)
    }

    fn push(
        &mut self,
        table: &str,
        record_id: &str,
        before: Option<Record>,
        after: Option<Record>,
        origin: WriteOrigin,
    ) {
        self.entries.push(JournalEntry {
            seq: self.entries.len() as u64,
            table: table.to_string(),
            record_id: record_id.to_string(),
            before,
            after,
            origin,
        });
    }

    /// Undo every journaled write, newest first.
    ///
    /// Each record is restored once, to the image it had before its first
    /// write in the run. The journal is empty afterwards.
    pub fn rollback(&mut self, target: &dyn TargetStore) -> RollbackReport {
        let mut first_write: HashMap<(&str, &str), usize> = HashMap::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            first_write
                .entry((entry.table.as_str(), entry.record_id.as_str()))
                .or_insert(idx);
        }

        let mut report = RollbackReport::default();
        for (idx, entry) in self.entries.iter().enumerate().rev() {
            if first_write.get(&(entry.table.as_str(), entry.record_id.as_str())) != Some(&idx) {
                continue;
            }
            let outcome = match &entry.before {
                Some(before) => target.save(&entry.table, before).map(|_| true),
                None => target.delete(&entry.table, &entry.record_id).map(|_| false),
            };
            match outcome {
                Ok(true) => report.restored += 1,
                Ok(false) => report.removed += 1,
                Err(e) => {
                    warn!(table = %entry.table, record_id = %entry.record_id, error = %e, "restore failed");
                    report
                        .unrestored
                        .push(format!("{}/{}", entry.table, entry.record_id));
                    report.errors.push(e.to_string());
                }
            }
        }

        debug!(
            restored = report.restored,
            removed = report.removed,
            unrestored = report.unrestored.len(),
            "journal replayed"
        );
        self.entries.clear();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MemoryTarget;

    #[test]
    fn test_rollback_restores_earliest_image() {
        let target = MemoryTarget::new();
        let original = Record::with_id("p1").with_field("name", "original");
        target.save("processes", &original).unwrap();
        let untouched = Record::with_id("p2").with_field("name", "untouched");
        target.save("processes", &untouched).unwrap();
        let before = target.snapshot();

        let mut journal = RunJournal::new();
        journal
            .save(&target, "processes", &Record::with_id("p1").with_field("name", "v2"), WriteOrigin::Migration)
            .unwrap();
        journal
            .save(&target, "processes", &Record::with_id("p1").with_field("name", "v3"), WriteOrigin::Fix)
            .unwrap();
        journal
            .save(&target, "processes", &Record::with_id("p3"), WriteOrigin::Migration)
            .unwrap();
        assert!(journal.delete(&target, "processes", "p2", WriteOrigin::Fix).unwrap());
        assert!(!journal.delete(&target, "processes", "p404", WriteOrigin::Fix).unwrap());
        assert_eq!(journal.len(), 4);
        assert_eq!(journal.entries()[1].before.as_ref().unwrap().get("name"), Some(&"v2".into()));

        let report = journal.rollback(&target);
        assert!(report.is_complete());
        assert_eq!(report.restored, 2);
        assert_eq!(report.removed, 1);
        assert!(journal.is_empty());
        assert_eq!(target.snapshot(), before);
    }
}
