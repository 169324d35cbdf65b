//! In-process target adapter.

use super::{RecordFilter, TargetStore};
use crate::error::StoreError;
use crate::record::Record;
use parking_lot::RwLock;
use std::collections::BTreeMap;

type Tables = BTreeMap<String, BTreeMap<String, Record>>;

/// Target store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    tables: RwLock<Tables>,
}

impl MemoryTarget {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Whether every table is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.read().values().all(BTreeMap::is_empty)
    }

    /// Copy of the full contents, for comparisons in tests and audits.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Record>> {
        self.tables
            .read()
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(table, records)| (table.clone(), records.clone()))
            .collect()
    }
}

impl TargetStore for MemoryTarget {
    fn save(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|records| records.get(id))
            .cloned())
    }

    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .write()
            .get_mut(table)
            .map(|records| records.remove(id).is_some())
            .unwrap_or(false))
    }

    fn query(&self, table: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|records| {
                records
                    .values()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
