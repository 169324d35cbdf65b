//! JSON reports for audit.
//!
//! Every report type serialises to pretty JSON and loads back unchanged.

use crate::detect::GapReport;
use crate::error::Result;
use crate::fix::{FixOutcome, FixStatus};
use crate::migration::MigrationResult;
use crate::validate::ValidationResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// A report that can be written to and read from a JSON file.
pub trait JsonReport: Serialize + DeserializeOwned {
    /// Write the report as pretty JSON.
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Read a report written by [`JsonReport::save`].
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// The report as a pretty JSON string.
    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl JsonReport for MigrationResult {}
impl JsonReport for GapReport {}
impl JsonReport for ValidationReport {}
impl JsonReport for FixReport {}

/// Validation results of a run, with totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    /// Build a report from individual results.
    pub fn new(results: Vec<ValidationResult>) -> Self {
        let total_errors = results.iter().map(|r| r.errors.len()).sum();
        let total_warnings = results.iter().map(|r| r.warnings.len()).sum();
        Self {
            is_valid: total_errors == 0,
            total_errors,
            total_warnings,
            results,
        }
    }
}

/// Outcome of a fix pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    /// Whether the pass ran without committing.
    pub dry_run: bool,
    pub total: usize,
    pub applied: usize,
    pub dry_run_count: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The pass stopped at the first failure.
    pub aborted: bool,
    pub outcomes: Vec<FixOutcome>,
}

impl FixReport {
    /// Build a report, computing the counters.
    pub fn new(dry_run: bool, outcomes: Vec<FixOutcome>, aborted: bool) -> Self {
        let count = |status: FixStatus| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            dry_run,
            total: outcomes.len(),
            applied: count(FixStatus::Applied),
            dry_run_count: count(FixStatus::DryRun),
            skipped: count(FixStatus::Skipped),
            failed: count(FixStatus::Failed),
            aborted,
            outcomes,
        }
    }

    /// Some fixes were committed and some were not.
    pub fn is_partial(&self) -> bool {
        self.applied > 0 && (self.failed > 0 || self.aborted)
    }

    /// Outcomes with a given status.
    pub fn with_status(&self, status: FixStatus) -> impl Iterator<Item = &FixOutcome> {
        self.outcomes.iter().filter(move |o| o.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DataGap, GapType};
    use crate::fix::FixAction;
    use crate::validate::{BatchScope, IssueCode, ValidationIssue};
    use tempfile::TempDir;

    #[test]
    fn test_validation_report_totals() {
        let mut bad = ValidationResult::new(BatchScope::batch("processes", 1, 10));
        bad.error(ValidationIssue::new(IssueCode::DuplicateId, "dup"));
        bad.warn(ValidationIssue::new(IssueCode::UnknownField, "extra"));
        let good = ValidationResult::new(BatchScope::batch("processes", 0, 10));

        let report = ValidationReport::new(vec![good, bad]);
        assert!(!report.is_valid);
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.total_warnings, 1);
    }

    #[test]
    fn test_fix_report_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fix.json");

        let gap = DataGap::new("processes", GapType::SchemaMismatch, "p1", "owner only in target");
        let outcome = FixOutcome {
            action: FixAction::skip(gap, true),
            status: FixStatus::Skipped,
            error: None,
            before: None,
            after: None,
        };
        let report = FixReport::new(true, vec![outcome], false);
        report.save(&path).unwrap();

        let loaded = FixReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.skipped, 1);
        assert!(!loaded.is_partial());
    }
}
