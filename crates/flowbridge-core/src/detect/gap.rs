//! Gap classification.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of divergence between source and target.
///
/// Declaration order is the reporting order within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapType {
    /// In the source, absent from the target.
    MissingRecord,
    /// In the target, absent from the source.
    OrphanedRecord,
    /// The target carries populated fields the source does not have.
    SchemaMismatch,
    /// Structurally invalid data on either side.
    DataCorruption,
    /// A foreign key that does not resolve on its own side.
    IntegrityViolation,
    /// Fields populated on the source but not on the target.
    IncompleteMigration,
    /// Both sides modified independently.
    VersionConflict,
}

impl GapType {
    /// All gap types in reporting order.
    pub const ALL: [GapType; 7] = [
        GapType::MissingRecord,
        GapType::OrphanedRecord,
        GapType::SchemaMismatch,
        GapType::DataCorruption,
        GapType::IntegrityViolation,
        GapType::IncompleteMigration,
        GapType::VersionConflict,
    ];

    /// Severity before any data-specific escalation.
    pub fn default_severity(self) -> Severity {
        match self {
            GapType::MissingRecord => Severity::High,
            GapType::OrphanedRecord => Severity::Medium,
            GapType::SchemaMismatch => Severity::High,
            GapType::DataCorruption => Severity::Critical,
            GapType::IntegrityViolation => Severity::High,
            GapType::IncompleteMigration => Severity::Medium,
            GapType::VersionConflict => Severity::Medium,
        }
    }

    /// Whether gaps of this type can be repaired without an operator.
    pub fn auto_fixable(self) -> bool {
        matches!(
            self,
            GapType::MissingRecord
                | GapType::OrphanedRecord
                | GapType::IncompleteMigration
                | GapType::VersionConflict
        )
    }

    /// Upper-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            GapType::MissingRecord => "MISSING_RECORD",
            GapType::OrphanedRecord => "ORPHANED_RECORD",
            GapType::SchemaMismatch => "SCHEMA_MISMATCH",
            GapType::DataCorruption => "DATA_CORRUPTION",
            GapType::IntegrityViolation => "INTEGRITY_VIOLATION",
            GapType::IncompleteMigration => "INCOMPLETE_MIGRATION",
            GapType::VersionConflict => "VERSION_CONFLICT",
        }
    }
}

impl fmt::Display for GapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gap severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One detected divergence.
///
/// Built only by the detector; consumers treat it as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGap {
    /// Table of the record.
    pub table: String,
    /// Classification.
    pub gap_type: GapType,
    /// Affected record.
    pub record_id: String,
    /// Human-readable explanation.
    pub description: String,
    /// Source image, when the record exists there.
    pub source_data: Option<Value>,
    /// Target image, when the record exists there.
    pub target_data: Option<Value>,
    /// Severity after escalation.
    pub severity: Severity,
    /// Whether an automatic fix exists for this gap.
    pub auto_fixable: bool,
}

impl DataGap {
    pub(crate) fn new(
        table: &str,
        gap_type: GapType,
        record_id: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            table: table.to_string(),
            gap_type,
            record_id: record_id.to_string(),
            description: description.into(),
            source_data: None,
            target_data: None,
            severity: gap_type.default_severity(),
            auto_fixable: gap_type.auto_fixable(),
        }
    }

    pub(crate) fn with_source(mut self, record: Option<&Record>) -> Self {
        self.source_data = record.map(Record::to_value);
        self
    }

    pub(crate) fn with_target(mut self, record: Option<&Record>) -> Self {
        self.target_data = record.map(Record::to_value);
        self
    }

    /// Raise severity; never lowers it.
    pub(crate) fn escalate(mut self, severity: Severity) -> Self {
        self.severity = self.severity.max(severity);
        self
    }

    /// Identity used for de-duplication.
    pub fn key(&self) -> (&str, &str, GapType) {
        (&self.table, &self.record_id, self.gap_type)
    }

    /// Whether the gap is critical.
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}
