//! Flowbridge Core - source-to-target reconciliation and migration.
//!
//! This crate moves process records from a relational source into a target
//! store, finds the ways the two have drifted apart, repairs what can be
//! repaired automatically, and undoes a run's writes when it fails.

pub mod cache;
pub mod catalog;
pub mod compat;
pub mod detect;
pub mod error;
pub mod fix;
pub mod journal;
pub mod migration;
pub mod record;
pub mod report;
pub mod source;
pub mod target;
pub mod validate;

pub use cache::{CacheConfig, CacheStats, CachedTarget, RecordCache};
pub use catalog::{Catalog, FieldDef, FieldKind, ForeignKey, TableDef};
pub use compat::ProcessDocuments;
pub use detect::{DataGap, GapDetector, GapReport, GapType, Severity};
pub use error::{Error, ErrorKind, Result, StoreError, StoreSide};
pub use fix::{
    AutoFixEngine, FixAction, FixConfig, FixOutcome, FixStatus, FixStrategy, MergeTieBreak,
    PlannedOperation,
};
pub use journal::{JournalEntry, RollbackReport, RunJournal, WriteOrigin};
pub use migration::{
    CancellationToken, ErrorEntry, MigrationConfig, MigrationOrchestrator, MigrationResult,
    ProgressEvent, ProgressStats, RunState, RunStatus, TableResult, TableStatus,
};
pub use record::Record;
pub use report::{FixReport, JsonReport, ValidationReport};
pub use source::{SourceStore, SqliteSource};
pub use target::{MemoryTarget, RecordFilter, SledTarget, TargetConfig, TargetStore};
pub use validate::{DataValidator, ValidationResult};
