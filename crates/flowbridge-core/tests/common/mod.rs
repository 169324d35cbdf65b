//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use flowbridge_core::source::PROCESS_SCHEMA;
use flowbridge_core::{Catalog, MemoryTarget, Record, SourceStore, SqliteSource, StoreError, TargetStore};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

pub const TS_OLD: &str = "2024-01-01T00:00:00Z";
pub const TS_NEW: &str = "2024-06-01T00:00:00Z";

/// A seeded SQLite source next to an in-memory target.
pub struct TestContext {
    pub catalog: Catalog,
    pub target: MemoryTarget,
    source_path: PathBuf,
    _dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("source.db");
        let conn = Connection::open(&source_path).unwrap();
        conn.execute_batch(PROCESS_SCHEMA).unwrap();

        Self {
            catalog: Catalog::process_catalog(),
            target: MemoryTarget::new(),
            source_path,
            _dir: dir,
        }
    }

    pub fn source_path(&self) -> &PathBuf {
        &self.source_path
    }

    /// A fresh read-only handle, so it sees every write made so far.
    pub fn source(&self) -> SqliteSource {
        SqliteSource::open(&self.source_path, &self.catalog).unwrap()
    }

    pub fn execute(&self, sql: &str) {
        let conn = Connection::open(&self.source_path).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    /// Insert processes `p0001..=pNNNN` with a name and timestamp.
    pub fn seed_processes(&self, count: usize) {
        let mut conn = Connection::open(&self.source_path).unwrap();
        let tx = conn.transaction().unwrap();
        for i in 1..=count {
            tx.execute(
                "INSERT INTO processes (id, name, status, version, updated_at) VALUES (?1, ?2, 'draft', 1, ?3)",
                params![process_id(i), format!("Process {i}"), TS_OLD],
            )
            .unwrap();
        }
        tx.commit().unwrap();
    }

    /// Add two elements and one connection under `process`.
    pub fn seed_diagram(&self, process: &str) {
        self.execute(&format!(
            r#"
            INSERT INTO elements (id, process_id, element_type, name, properties, updated_at)
                VALUES ('{process}-e1', '{process}', 'start', 'Start', '{{"color":"green"}}', '{TS_OLD}');
            INSERT INTO elements (id, process_id, element_type, name, updated_at)
                VALUES ('{process}-e2', '{process}', 'task', 'Review', '{TS_OLD}');
            INSERT INTO connections (id, process_id, source_element_id, target_element_id, updated_at)
                VALUES ('{process}-c1', '{process}', '{process}-e1', '{process}-e2', '{TS_OLD}');
            INSERT INTO metadata (id, process_id, key, value, updated_at)
                VALUES ('{process}-m1', '{process}', 'owner', '"ops"', '{TS_OLD}');
            "#
        ));
    }

    /// Copy source records into the target unchanged.
    pub fn copy_to_target(&self, table: &str, ids: &[String]) {
        for record in self.source().get_many(table, ids).unwrap() {
            self.target.save(table, &record).unwrap();
        }
    }
}

pub fn process_id(i: usize) -> String {
    format!("p{i:04}")
}

pub fn process(id: &str, name: &str, updated_at: &str) -> Record {
    Record::with_id(id)
        .with_field("name", name)
        .with_field("updated_at", updated_at)
}

/// Target wrapper that fails on demand.
#[derive(Default)]
pub struct FlakyTarget {
    pub inner: MemoryTarget,
    /// Every call fails with a connectivity error.
    pub unreachable: AtomicBool,
    /// Saves of these ids fail with a backend error.
    pub failing_ids: parking_lot::Mutex<HashSet<String>>,
    /// Saves fail once this many have succeeded.
    pub save_budget: parking_lot::Mutex<Option<usize>>,
    /// Deletes fail with a backend error.
    pub deletes_fail: AtomicBool,
    pub saves: AtomicUsize,
}

impl FlakyTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_id(&self, id: &str) {
        self.failing_ids.lock().insert(id.to_string());
    }

    pub fn fail_after(&self, saves: usize) {
        *self.save_budget.lock() = Some(saves);
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl TargetStore for FlakyTarget {
    fn save(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        self.check_reachable()?;
        if self.failing_ids.lock().contains(&record.id) {
            return Err(StoreError::Backend(format!("write rejected for {}", record.id)));
        }
        if let Some(budget) = *self.save_budget.lock() {
            if self.saves.load(Ordering::SeqCst) >= budget {
                return Err(StoreError::Backend("disk full".to_string()));
            }
        }
        self.inner.save(table, record)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        self.check_reachable()?;
        self.inner.get(table, id)
    }

    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.check_reachable()?;
        self.inner.list_ids(table)
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        self.check_reachable()?;
        if self.deletes_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("delete rejected".to_string()));
        }
        self.inner.delete(table, id)
    }
}
