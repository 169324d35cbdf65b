//! Record type exchanged between stores.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Maximum accepted identifier length.
pub const MAX_ID_LEN: usize = 128;

/// A keyed document read from the source or stored in the target.
///
/// `data` holds every column of the row, including the id column. Payloads are
/// opaque to the engine beyond the fields named in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier, unique within its table.
    pub id: String,
    /// Field values.
    pub data: Map<String, Value>,
}

impl Record {
    /// Create a record from an id and its field map.
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Create a record whose only field is its `id`.
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(id.clone()));
        Self { id, data }
    }

    /// Build a record from a JSON value. Returns `None` unless the value is an object.
    pub fn from_value(id: impl Into<String>, value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self::new(id, data)),
            _ => None,
        }
    }

    /// Set a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Whether a field is present with a non-null value.
    pub fn is_populated(&self, field: &str) -> bool {
        matches!(self.data.get(field), Some(v) if !v.is_null())
    }

    /// Names of fields present with non-null values.
    pub fn populated_fields(&self) -> BTreeSet<&str> {
        self.data
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Content checksum over the canonical JSON encoding (blake3, hex).
    ///
    /// Keys are sorted, so two records with equal fields always hash equally.
    pub fn checksum(&self) -> String {
        let bytes = serde_json::to_vec(&self.data).unwrap_or_default();
        hex::encode(blake3::hash(&bytes).as_bytes())
    }

    /// The record as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Parse the named field as a timestamp.
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.data.get(field).and_then(parse_timestamp)
    }
}

/// Parse a timestamp value.
///
/// Accepts RFC 3339 strings, SQLite `YYYY-MM-DD HH:MM:SS[.fff]` strings, and
/// integer epoch seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

/// Whether a string is a well-formed record identifier.
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}
