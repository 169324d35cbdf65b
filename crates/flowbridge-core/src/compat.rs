//! Adapter for the deprecated process-document API.
//!
//! Older callers read and write one document per process, with its elements,
//! connections and metadata nested as arrays. [`ProcessDocuments`] maps those
//! calls onto per-table records of a [`TargetStore`]. Nothing in the
//! reconciliation engine depends on this module.

use crate::error::{Error, Result, StoreSide};
use crate::record::{is_valid_identifier, Record};
use crate::target::{RecordFilter, TargetStore};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

const PROCESS_TABLE: &str = "processes";
const PARENT_FIELD: &str = "process_id";

/// Nested document field and the table its items live in, parents first.
const NESTED: [(&str, &str); 3] = [
    ("elements", "elements"),
    ("connections", "connections"),
    ("metadata", "metadata"),
];

/// Legacy process-document facade over a target store.
pub struct ProcessDocuments<T> {
    target: T,
}

impl<T: TargetStore> ProcessDocuments<T> {
    /// Wrap a target store.
    pub fn new(target: T) -> Self {
        Self { target }
    }

    /// The wrapped store.
    pub fn into_inner(self) -> T {
        self.target
    }

    /// Save a process document, replacing any earlier version.
    ///
    /// Nested items missing from the new document are deleted. Returns the
    /// process id.
    pub fn save_process(&self, document: &Value) -> Result<String> {
        let Value::Object(fields) = document else {
            return Err(Error::InvalidDocument("expected a JSON object".to_string()));
        };
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| is_valid_identifier(id))
            .ok_or_else(|| Error::InvalidDocument("missing or malformed process id".to_string()))?
            .to_string();

        let mut process = Map::new();
        let mut children: Vec<(&str, Vec<Record>)> = Vec::new();
        for (key, value) in fields {
            match NESTED.iter().find(|(field, _)| *field == key.as_str()) {
                Some((field, table)) => children.push((*table, explode(&id, field, value)?)),
                None => {
                    process.insert(key.clone(), value.clone());
                }
            }
        }

        self.target
            .save(PROCESS_TABLE, &Record::new(&id, process))
            .map_err(target_error)?;

        for (_, table) in NESTED {
            let items = children
                .iter()
                .find(|(t, _)| *t == table)
                .map(|(_, items)| items.as_slice())
                .unwrap_or_default();
            for item in items {
                self.target.save(table, item).map_err(target_error)?;
            }
        }

        // Stale items go children-first so no connection outlives its element.
        for (_, table) in NESTED.iter().rev() {
            let keep: HashSet<&str> = children
                .iter()
                .filter(|(t, _)| t == table)
                .flat_map(|(_, items)| items.iter().map(|r| r.id.as_str()))
                .collect();
            for stale in self.children_of(table, &id)? {
                if !keep.contains(stale.id.as_str()) {
                    self.target.delete(table, &stale.id).map_err(target_error)?;
                }
            }
        }

        debug!(process_id = %id, "saved legacy process document");
        Ok(id)
    }

    /// Reassemble a process document.
    pub fn load_process(&self, id: &str) -> Result<Option<Value>> {
        let Some(process) = self.target.get(PROCESS_TABLE, id).map_err(target_error)? else {
            return Ok(None);
        };

        let mut document = process.data;
        for (field, table) in NESTED {
            let items = self
                .children_of(table, id)?
                .into_iter()
                .map(|mut item| {
                    item.data.remove(PARENT_FIELD);
                    Value::Object(item.data)
                })
                .collect();
            document.insert(field.to_string(), Value::Array(items));
        }
        Ok(Some(Value::Object(document)))
    }

    /// Delete a process and everything nested under it.
    ///
    /// Returns whether the process existed.
    pub fn delete_process(&self, id: &str) -> Result<bool> {
        for (_, table) in NESTED.iter().rev() {
            for child in self.children_of(table, id)? {
                self.target.delete(table, &child.id).map_err(target_error)?;
            }
        }
        self.target.delete(PROCESS_TABLE, id).map_err(target_error)
    }

    /// Ids of every stored process.
    pub fn list_processes(&self) -> Result<Vec<String>> {
        self.target.list_ids(PROCESS_TABLE).map_err(target_error)
    }

    fn children_of(&self, table: &str, process_id: &str) -> Result<Vec<Record>> {
        self.target
            .query(table, &RecordFilter::new().field_eq(PARENT_FIELD, process_id))
            .map_err(target_error)
    }
}

fn target_error(err: crate::error::StoreError) -> Error {
    Error::from_store(StoreSide::Target, err)
}

/// Turn one nested field into child records.
///
/// Metadata may also come as a plain `{key: value}` object; its items get
/// `{process_id}:{key}` ids when they carry none.
fn explode(process_id: &str, field: &str, value: &Value) -> Result<Vec<Record>> {
    let items: Vec<Map<String, Value>> = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(Error::InvalidDocument(format!("{field} items must be objects"))),
            })
            .collect::<Result<_>>()?,
        Value::Object(entries) if field == "metadata" => entries
            .iter()
            .map(|(key, value)| {
                let mut map = Map::new();
                map.insert("key".to_string(), Value::String(key.clone()));
                map.insert("value".to_string(), value.clone());
                map
            })
            .collect(),
        _ => return Err(Error::InvalidDocument(format!("{field} must be an array"))),
    };

    items
        .into_iter()
        .map(|mut data| {
            let id = match data.get("id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => match data.get("key").and_then(Value::as_str) {
                    Some(key) if field == "metadata" => format!("{process_id}:{key}"),
                    _ => return Err(Error::InvalidDocument(format!("{field} item without id"))),
                },
            };
            if !is_valid_identifier(&id) {
                return Err(Error::InvalidDocument(format!("malformed {field} id: {id}")));
            }
            data.insert("id".to_string(), Value::String(id.clone()));
            data.insert(PARENT_FIELD.to_string(), Value::String(process_id.to_string()));
            Ok(Record::new(id, data))
        })
        .collect()
}
