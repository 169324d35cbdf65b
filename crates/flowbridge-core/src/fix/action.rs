//! Fix actions and their outcomes.

use crate::detect::{DataGap, GapType};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repair strategy for a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixStrategy {
    /// Write the source record verbatim.
    CopyFromSource,
    /// Delete the target record.
    DeleteFromTarget,
    /// Add fields the target is missing, never touching populated ones.
    UpdateTarget,
    /// Field-level merge, later timestamp wins.
    MergeData,
    /// No automatic repair.
    Skip,
}

impl FixStrategy {
    /// The strategy that repairs a gap type.
    pub fn for_gap(gap_type: GapType) -> Self {
        match gap_type {
            GapType::MissingRecord => FixStrategy::CopyFromSource,
            GapType::OrphanedRecord => FixStrategy::DeleteFromTarget,
            GapType::IncompleteMigration => FixStrategy::UpdateTarget,
            GapType::VersionConflict => FixStrategy::MergeData,
            GapType::SchemaMismatch | GapType::DataCorruption | GapType::IntegrityViolation => {
                FixStrategy::Skip
            }
        }
    }

    /// Whether the strategy removes records.
    pub fn is_delete(self) -> bool {
        self == FixStrategy::DeleteFromTarget
    }
}

impl fmt::Display for FixStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FixStrategy::CopyFromSource => "COPY_FROM_SOURCE",
            FixStrategy::DeleteFromTarget => "DELETE_FROM_TARGET",
            FixStrategy::UpdateTarget => "UPDATE_TARGET",
            FixStrategy::MergeData => "MERGE_DATA",
            FixStrategy::Skip => "SKIP",
        };
        f.write_str(name)
    }
}

/// What an action will do to the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlannedOperation {
    /// Save this image.
    Write { record: Record },
    /// Delete the record.
    Delete { record_id: String },
    /// Leave the target alone.
    None,
}

/// A reversible repair derived from one gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAction {
    /// The gap being repaired.
    pub gap: DataGap,
    /// Chosen strategy.
    pub strategy: FixStrategy,
    /// Planned target operation.
    pub operation: PlannedOperation,
    /// Evaluate only, never commit.
    pub dry_run: bool,
}

impl FixAction {
    /// An action that leaves the target alone.
    pub fn skip(gap: DataGap, dry_run: bool) -> Self {
        Self {
            gap,
            strategy: FixStrategy::Skip,
            operation: PlannedOperation::None,
            dry_run,
        }
    }
}

/// Status of an evaluated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    /// Committed to the target.
    Applied,
    /// Evaluated without committing.
    DryRun,
    /// Nothing to do.
    Skipped,
    /// Planning or writing failed.
    Failed,
}

/// Result of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub action: FixAction,
    pub status: FixStatus,
    pub error: Option<String>,
    /// Target image before the action.
    pub before: Option<Record>,
    /// Target image after the action (planned, for dry runs).
    pub after: Option<Record>,
}
