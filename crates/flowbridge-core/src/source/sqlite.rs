//! SQLite source adapter.
//!
//! Opens the database read-only and maps every row to a JSON document keyed by
//! column name. JSON columns come back as their raw text; detection and
//! validation parse them.

use super::SourceStore;
use crate::catalog::{Catalog, TableDef};
use crate::error::StoreError;
use crate::record::Record;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// DDL for the process-diagram tables described by [`Catalog::process_catalog`].
///
/// Only the ids are constrained; legacy databases carry no NOT NULL or FK
/// enforcement, which is exactly what gap detection has to cope with.
pub const PROCESS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS processes (
    id TEXT PRIMARY KEY,
    name TEXT,
    description TEXT,
    status TEXT,
    version INTEGER,
    definition TEXT,
    tags TEXT,
    created_at TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS elements (
    id TEXT PRIMARY KEY,
    process_id TEXT,
    element_type TEXT,
    name TEXT,
    properties TEXT,
    position TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS connections (
    id TEXT PRIMARY KEY,
    process_id TEXT,
    source_element_id TEXT,
    target_element_id TEXT,
    connection_type TEXT,
    label TEXT,
    properties TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS metadata (
    id TEXT PRIMARY KEY,
    process_id TEXT,
    key TEXT,
    value TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_elements_process ON elements(process_id);
CREATE INDEX IF NOT EXISTS idx_connections_process ON connections(process_id);
CREATE INDEX IF NOT EXISTS idx_metadata_process ON metadata(process_id);
"#;

/// Maximum number of bound parameters per `IN (...)` lookup.
const MAX_IN_PARAMS: usize = 500;

/// Read-only SQLite source.
pub struct SqliteSource {
    conn: Connection,
    tables: HashMap<String, String>,
}

impl SqliteSource {
    /// Open a database file read-only.
    ///
    /// Only tables named by the catalog can be read; their names are the only
    /// identifiers ever interpolated into SQL.
    pub fn open(path: impl AsRef<Path>, catalog: &Catalog) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // Fails here rather than on first read when the file is not a database.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;

        Ok(Self {
            conn,
            tables: catalog
                .tables
                .iter()
                .map(|t: &TableDef| (t.name.clone(), t.id_field.clone()))
                .collect(),
        })
    }

    fn id_field(&self, table: &str) -> Result<&str, StoreError> {
        self.tables
            .get(table)
            .map(String::as_str)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

impl SourceStore for SqliteSource {
    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let id_field = self.id_field(table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT \"{id_field}\" FROM \"{table}\" WHERE \"{id_field}\" IS NOT NULL"
        ))?;
        let mut ids = stmt
            .query_map([], |row| Ok(id_to_string(row.get_ref(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort();
        Ok(ids)
    }

    fn count_null_ids(&self, table: &str) -> Result<usize, StoreError> {
        let id_field = self.id_field(table)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM \"{table}\" WHERE \"{id_field}\" IS NULL"),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.get_many(table, &[id.to_string()])?.into_iter().next())
    }

    fn get_many(&self, table: &str, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let id_field = self.id_field(table)?;
        let mut found: HashMap<String, Record> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IN_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT * FROM \"{table}\" WHERE \"{id_field}\" IN ({placeholders})"
            ))?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                row_to_record(row, &columns, id_field)
            })?;
            for record in rows {
                let record = record?;
                found.insert(record.id.clone(), record);
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}

fn row_to_record(row: &Row<'_>, columns: &[String], id_field: &str) -> rusqlite::Result<Record> {
    let mut data = Map::new();
    let mut id = String::new();
    for (idx, name) in columns.iter().enumerate() {
        let value = row.get_ref(idx)?;
        if name == id_field {
            id = id_to_string(value);
        }
        data.insert(name.clone(), to_json(value));
    }
    Ok(Record::new(id, data))
}

fn id_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => hex::encode(b),
        ValueRef::Null => String::new(),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded() -> (TempDir, SqliteSource) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("source.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(PROCESS_SCHEMA).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO processes (id, name, version, definition, updated_at)
                VALUES ('p2', 'Refunds', 3, '{"lanes":[]}', '2024-03-01 10:00:00');
            INSERT INTO processes (id, name) VALUES ('p1', 'Orders');
            "#,
        )
        .unwrap();
        drop(conn);

        let source = SqliteSource::open(&path, &Catalog::process_catalog()).unwrap();
        (dir, source)
    }

    #[test]
    fn test_list_ids_sorted() {
        let (_dir, source) = seeded();
        assert_eq!(source.list_ids("processes").unwrap(), vec!["p1", "p2"]);
        assert!(source.list_ids("elements").unwrap().is_empty());
        assert_eq!(source.count_null_ids("processes").unwrap(), 0);
    }

    #[test]
    fn test_null_ids_counted_not_listed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("source.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(PROCESS_SCHEMA).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO processes (id, name) VALUES ('p1', 'Orders');
            INSERT INTO processes (id, name) VALUES (NULL, 'Lost');
            INSERT INTO processes (id, name) VALUES (NULL, 'Also lost');
            "#,
        )
        .unwrap();
        drop(conn);

        let source = SqliteSource::open(&path, &Catalog::process_catalog()).unwrap();
        assert_eq!(source.list_ids("processes").unwrap(), vec!["p1"]);
        assert_eq!(source.count_null_ids("processes").unwrap(), 2);
    }

    #[test]
    fn test_schema_accepts_dangling_references() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("source.db")).unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(PROCESS_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO elements (id, process_id, element_type) VALUES ('e1', 'p404', 'task')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_row_mapping() {
        let (_dir, source) = seeded();
        let record = source.get("processes", "p2").unwrap().unwrap();
        assert_eq!(record.id, "p2");
        assert_eq!(record.get("version"), Some(&Value::from(3)));
        assert_eq!(record.get("definition"), Some(&Value::from("{\"lanes\":[]}")));
        assert_eq!(record.get("description"), Some(&Value::Null));

        assert!(source.get("processes", "nope").unwrap().is_none());
    }

    #[test]
    fn test_get_many_follows_request_order() {
        let (_dir, source) = seeded();
        let ids = vec!["p2".to_string(), "missing".to_string(), "p1".to_string()];
        let records = source.get_many("processes", &ids).unwrap();
        let got: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["p2", "p1"]);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let (_dir, source) = seeded();
        assert_eq!(
            source.list_ids("users; DROP TABLE processes"),
            Err(StoreError::UnknownTable("users; DROP TABLE processes".into()))
        );
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = SqliteSource::open(dir.path().join("absent.db"), &Catalog::process_catalog())
            .err()
            .unwrap();
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_source_is_read_only() {
        let (_dir, source) = seeded();
        assert!(source
            .conn
            .execute("DELETE FROM processes", [])
            .is_err());
    }
}
