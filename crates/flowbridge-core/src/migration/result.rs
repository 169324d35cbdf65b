//! Migration run results.

use super::config::MigrationConfig;
use super::progress::ProgressStats;
use super::state::RunStatus;
use crate::detect::DataGap;
use crate::error::{Error, ErrorKind};
use crate::journal::RollbackReport;
use crate::report::{FixReport, ValidationReport};
use crate::validate::ValidationResult;
use serde::{Deserialize, Serialize};

/// Outcome of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Not reached.
    Pending,
    /// Every batch written and no new critical gaps.
    Completed,
    /// Some batches or records failed but the table ran to the end.
    Partial,
    /// The table was aborted.
    Failed,
    /// The table's writes were undone.
    RolledBack,
}

/// Per-table breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableResult {
    pub table: String,
    pub status: TableStatus,
    /// Records read from the source, including rows without an id.
    pub source_records: usize,
    /// Source rows skipped because their id is null.
    #[serde(default)]
    pub null_id_records: usize,
    /// Records written to the target (zero in dry runs).
    pub migrated_records: usize,
    /// Batches processed.
    pub batches: usize,
    /// Size of each processed batch.
    pub batch_sizes: Vec<usize>,
    /// Indexes of batches that failed validation or writing.
    pub failed_batches: Vec<usize>,
    /// Gaps found before the table was migrated.
    pub baseline_gaps: usize,
    /// Gaps found after the table was migrated.
    pub post_gaps: usize,
}

impl TableResult {
    pub(crate) fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            status: TableStatus::Pending,
            source_records: 0,
            null_id_records: 0,
            migrated_records: 0,
            batches: 0,
            batch_sizes: Vec::new(),
            failed_batches: Vec::new(),
            baseline_gaps: 0,
            post_gaps: 0,
        }
    }
}

/// An error recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub table: Option<String>,
    pub batch_index: Option<usize>,
    pub record_id: Option<String>,
    pub message: String,
}

impl ErrorEntry {
    /// Record an engine error.
    pub fn from_error(err: &Error, table: Option<&str>) -> Self {
        let (batch_index, record_id) = match err {
            Error::Validation { batch_index, .. } => (Some(*batch_index), None),
            Error::FixExecution { record_id, .. } => (None, Some(record_id.clone())),
            _ => (None, None),
        };
        Self {
            kind: err.kind(),
            table: table.map(str::to_string),
            batch_index,
            record_id,
            message: err.to_string(),
        }
    }

    /// Attach a batch index.
    pub fn in_batch(mut self, batch_index: usize) -> Self {
        self.batch_index = Some(batch_index);
        self
    }

    /// Attach a record id.
    pub fn for_record(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub run_id: String,
    pub status: RunStatus,
    pub dry_run: bool,
    /// RFC 3339 start time.
    pub started_at: String,
    pub duration_ms: u64,
    /// Records read from the source across all tables.
    pub total_records: usize,
    /// Records written to the target across all tables.
    pub migrated_records: usize,
    pub tables: Vec<TableResult>,
    /// Gaps remaining after migration (the baseline when gap detection
    /// ran but nothing was written).
    pub gaps: Vec<DataGap>,
    /// Critical gaps present after migration but absent from the baseline.
    pub new_critical_gaps: Vec<DataGap>,
    pub errors: Vec<ErrorEntry>,
    pub validation: ValidationReport,
    pub fixes: Option<FixReport>,
    pub rollback: Option<RollbackReport>,
    pub progress: ProgressStats,
    pub config: MigrationConfig,
}

impl MigrationResult {
    pub(crate) fn new(run_id: &str, config: &MigrationConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Pending,
            dry_run: config.dry_run,
            started_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: 0,
            total_records: 0,
            migrated_records: 0,
            tables: Vec::new(),
            gaps: Vec::new(),
            new_critical_gaps: Vec::new(),
            errors: Vec::new(),
            validation: ValidationReport::new(Vec::new()),
            fixes: None,
            rollback: None,
            progress: ProgressStats::default(),
            config: config.clone(),
        }
    }

    pub(crate) fn push_validation(&mut self, result: ValidationResult) {
        let mut results = std::mem::take(&mut self.validation.results);
        results.push(result);
        self.validation = ValidationReport::new(results);
    }

    /// Whether the run completed.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Result for one table.
    pub fn table(&self, name: &str) -> Option<&TableResult> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Errors of one kind.
    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorEntry> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}
