//! Read access to the relational source store.

mod sqlite;

pub use sqlite::{SqliteSource, PROCESS_SCHEMA};

use crate::error::StoreError;
use crate::record::Record;

/// Read-only view of the authoritative source.
///
/// Implementations must return ids in ascending order so batching and gap
/// ordering are deterministic.
pub trait SourceStore {
    /// All record ids of a table, ascending.
    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError>;

    /// Rows of a table whose id is null. They cannot be listed or fetched,
    /// so callers report them separately.
    fn count_null_ids(&self, _table: &str) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Fetch one record.
    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// Fetch several records. Ids that do not exist are skipped; the result
    /// follows the order of `ids`.
    fn get_many(&self, table: &str, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(table, id)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl<T: SourceStore + ?Sized> SourceStore for &T {
    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_ids(table)
    }

    fn count_null_ids(&self, table: &str) -> Result<usize, StoreError> {
        (**self).count_null_ids(table)
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        (**self).get(table, id)
    }

    fn get_many(&self, table: &str, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        (**self).get_many(table, ids)
    }
}
