//! The polyglot target store, seen through one uniform interface.
//!
//! The engine never branches on which backend sits behind a [`TargetStore`].
//! [`MemoryTarget`] and [`SledTarget`] are the two adapters shipped here;
//! other persistence layers implement the same trait.

mod memory;
mod sled_store;

pub use self::memory::MemoryTarget;
pub use self::sled_store::{SledTarget, TargetConfig};

use crate::error::StoreError;
use crate::record::Record;
use serde_json::Value;

/// Equality filter over record fields. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    conditions: Vec<(String, Value)>,
}

impl RecordFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Whether a record satisfies every condition.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

/// Uniform interface over the target persistence layer.
pub trait TargetStore {
    /// Insert or replace a record.
    fn save(&self, table: &str, record: &Record) -> Result<(), StoreError>;

    /// Fetch a record by id.
    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// All record ids of a table, ascending.
    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError>;

    /// Delete a record. Returns whether it existed.
    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError>;

    /// Records matching a filter, ordered by id.
    fn query(&self, table: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        for id in self.list_ids(table)? {
            if let Some(record) = self.get(table, &id)? {
                if filter.matches(&record) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

impl<T: TargetStore + ?Sized> TargetStore for &T {
    fn save(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        (**self).save(table, record)
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        (**self).get(table, id)
    }

    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_ids(table)
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        (**self).delete(table, id)
    }

    fn query(&self, table: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        (**self).query(table, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_all_conditions() {
        let record = Record::with_id("e1")
            .with_field("process_id", "p1")
            .with_field("element_type", "task");

        assert!(RecordFilter::new().matches(&record));
        assert!(RecordFilter::new().field_eq("process_id", "p1").matches(&record));
        assert!(!RecordFilter::new()
            .field_eq("process_id", "p1")
            .field_eq("element_type", "gateway")
            .matches(&record));
        assert!(!RecordFilter::new().field_eq("missing", "x").matches(&record));
    }
}
