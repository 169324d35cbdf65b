//! On-disk target adapter backed by sled.
//!
//! Each table lives in its own tree keyed by record id. Values are rkyv-encoded
//! envelopes around the JSON payload.

use super::{RecordFilter, TargetStore};
use crate::error::StoreError;
use crate::record::{current_timestamp, Record};
use rkyv::{Archive, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Prefix for per-table tree names.
const TABLE_TREE_PREFIX: &str = "table:";

/// Configuration for the sled-backed target.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TargetConfig {
    /// Directory holding the database.
    pub path: PathBuf,
    /// Page cache size in bytes.
    pub cache_capacity: u64,
    /// Background flush interval. None flushes only on explicit `flush`.
    pub flush_every_ms: Option<u64>,
    /// Whether sled compresses pages.
    pub compression: bool,
    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./flowbridge_target"),
            cache_capacity: 256 * 1024 * 1024,
            flush_every_ms: Some(500),
            compression: true,
            temporary: false,
        }
    }
}

impl TargetConfig {
    /// Create a configuration for the given directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::new(),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the page cache size.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression)
            .flush_every_ms(self.flush_every_ms);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }
        config
    }
}

/// Stored envelope for one record.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
struct StoredRecord {
    /// JSON-encoded field map.
    payload: Vec<u8>,
    /// Write time in microseconds since the Unix epoch.
    written_at: u64,
}

impl StoredRecord {
    fn encode(record: &Record) -> Result<Vec<u8>, StoreError> {
        let envelope = StoredRecord {
            payload: serde_json::to_vec(&record.data)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            written_at: current_timestamp(),
        };
        rkyv::to_bytes::<rkyv::rancor::Error>(&envelope)
            .map(|v| v.to_vec())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn decode(id: &str, bytes: &[u8]) -> Result<Record, StoreError> {
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        let envelope = rkyv::from_bytes::<StoredRecord, rkyv::rancor::Error>(&aligned)
            .map_err(|e| StoreError::Corrupt(format!("{id}: {e}")))?;
        let data: Map<String, Value> = serde_json::from_slice(&envelope.payload)
            .map_err(|e| StoreError::Corrupt(format!("{id}: {e}")))?;
        Ok(Record::new(id, data))
    }
}

/// Target store persisted with sled.
pub struct SledTarget {
    db: sled::Db,
}

impl SledTarget {
    /// Open or create the database.
    pub fn open(config: &TargetConfig) -> Result<Self, StoreError> {
        let db = config.to_sled_config().open()?;
        Ok(Self { db })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, table: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(format!("{TABLE_TREE_PREFIX}{table}"))?)
    }

    fn id_from_key(key: &[u8]) -> Result<String, StoreError> {
        String::from_utf8(key.to_vec()).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

impl TargetStore for SledTarget {
    fn save(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        let bytes = StoredRecord::encode(record)?;
        self.tree(table)?.insert(record.id.as_bytes(), bytes)?;
        Ok(())
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        match self.tree(table)?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(StoredRecord::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.tree(table)?
            .iter()
            .keys()
            .map(|key| Self::id_from_key(&key?))
            .collect()
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self.tree(table)?.remove(id.as_bytes())?.is_some())
    }

    fn query(&self, table: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        for entry in self.tree(table)?.iter() {
            let (key, value) = entry?;
            let record = StoredRecord::decode(&Self::id_from_key(&key)?, &value)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
