//! Applies fix actions to the target.

use super::action::{FixAction, FixOutcome, FixStatus, FixStrategy, PlannedOperation};
use super::merge::{merge_records, MergeTieBreak};
use crate::catalog::Catalog;
use crate::detect::{DataGap, GapDetector};
use crate::error::{Error, Result, StoreError, StoreSide};
use crate::journal::{RollbackReport, RunJournal, WriteOrigin};
use crate::record::Record;
use crate::report::FixReport;
use crate::source::SourceStore;
use crate::target::TargetStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};

/// Fix engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixConfig {
    /// Evaluate actions without committing them.
    pub dry_run: bool,
    /// Keep going after a failed action.
    pub continue_on_error: bool,
    /// Merge behaviour on equal timestamps.
    pub merge_tie_break: MergeTieBreak,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            continue_on_error: true,
            merge_tie_break: MergeTieBreak::PreferTarget,
        }
    }
}

impl FixConfig {
    /// Set dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set whether failures stop the pass.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Set the merge tie-break.
    pub fn with_merge_tie_break(mut self, tie_break: MergeTieBreak) -> Self {
        self.merge_tie_break = tie_break;
        self
    }
}

/// Turns gaps into fix actions and applies them.
///
/// Writes go through a [`RunJournal`] so they can be rolled back. Fixes are
/// not transactional across records: a pass that stops midway leaves the
/// earlier fixes in place and says so in its report.
pub struct AutoFixEngine<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    catalog: &'a Catalog,
    config: FixConfig,
}

impl<'a> AutoFixEngine<'a> {
    /// Create an engine.
    pub fn new(
        source: &'a dyn SourceStore,
        target: &'a dyn TargetStore,
        catalog: &'a Catalog,
        config: FixConfig,
    ) -> Self {
        Self {
            source,
            target,
            catalog,
            config,
        }
    }

    /// Engine settings.
    pub fn config(&self) -> &FixConfig {
        &self.config
    }

    /// Build the action for a gap against the stores' current state.
    pub fn plan(&self, gap: &DataGap) -> Result<FixAction> {
        let strategy = FixStrategy::for_gap(gap.gap_type);
        let table = self.catalog.require_table(&gap.table)?;

        let operation = match strategy {
            FixStrategy::Skip => return Ok(FixAction::skip(gap.clone(), self.config.dry_run)),
            FixStrategy::CopyFromSource => {
                if self.read_target(gap)?.is_some() {
                    return Err(fix_error(gap, "record appeared in target since detection"));
                }
                let record = self
                    .read_source(gap)?
                    .ok_or_else(|| fix_error(gap, "record no longer exists in source"))?;
                PlannedOperation::Write { record }
            }
            FixStrategy::DeleteFromTarget => {
                if self.read_source(gap)?.is_some() {
                    return Err(fix_error(gap, "record appeared in source since detection"));
                }
                PlannedOperation::Delete {
                    record_id: gap.record_id.clone(),
                }
            }
            FixStrategy::UpdateTarget | FixStrategy::MergeData => {
                let source = self
                    .read_source(gap)?
                    .ok_or_else(|| fix_error(gap, "record no longer exists in source"))?;
                let target = self
                    .read_target(gap)?
                    .ok_or_else(|| fix_error(gap, "record no longer exists in target"))?;
                let fixed = if strategy == FixStrategy::UpdateTarget {
                    additive_patch(&source, &target)
                } else {
                    merge_records(table, &source, &target, self.config.merge_tie_break)
                };
                if fixed == target {
                    PlannedOperation::None
                } else {
                    PlannedOperation::Write { record: fixed }
                }
            }
        };

        Ok(FixAction {
            gap: gap.clone(),
            strategy,
            operation,
            dry_run: self.config.dry_run,
        })
    }

    /// Apply fixes for `gaps`.
    ///
    /// Writes run in table dependency order, parents first; deletes run
    /// afterwards, children first. Only connectivity failures are returned as
    /// errors; every other failure is recorded in the report.
    #[instrument(skip_all, fields(gaps = gaps.len(), dry_run = self.config.dry_run))]
    pub fn apply(&self, gaps: &[DataGap], journal: &mut RunJournal) -> Result<FixReport> {
        let mut ordered: Vec<&DataGap> = gaps.iter().collect();
        ordered.sort_by(|a, b| self.compare_for_apply(a, b));

        let mut outcomes = Vec::with_capacity(ordered.len());
        let mut aborted = false;

        for gap in ordered {
            match self.execute(gap, journal) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    warn!(table = %gap.table, record_id = %gap.record_id, error = %e, "fix failed");
                    outcomes.push(FixOutcome {
                        action: FixAction {
                            gap: gap.clone(),
                            strategy: FixStrategy::for_gap(gap.gap_type),
                            operation: PlannedOperation::None,
                            dry_run: self.config.dry_run,
                        },
                        status: FixStatus::Failed,
                        error: Some(e.to_string()),
                        before: None,
                        after: None,
                    });
                    if !self.config.continue_on_error {
                        aborted = true;
                        break;
                    }
                }
            }
        }

        let report = FixReport::new(self.config.dry_run, outcomes, aborted);
        info!(
            applied = report.applied,
            dry_run = report.dry_run_count,
            skipped = report.skipped,
            failed = report.failed,
            "fix pass complete"
        );
        Ok(report)
    }

    /// Detect every gap and fix what can be fixed.
    pub fn fix_all(&self, journal: &mut RunJournal) -> Result<FixReport> {
        let detector = GapDetector::new(self.source, self.target, self.catalog);
        let gaps = detector.detect_all_gaps()?;
        self.apply(&gaps.gaps, journal)
    }

    /// Detect gaps in the named tables and fix what can be fixed.
    pub fn fix_tables(&self, tables: &[&str], journal: &mut RunJournal) -> Result<FixReport> {
        let detector = GapDetector::new(self.source, self.target, self.catalog);
        let gaps = detector.detect_tables(tables)?;
        self.apply(&gaps.gaps, journal)
    }

    /// Undo every write recorded in `journal`.
    pub fn rollback(&self, journal: &mut RunJournal) -> RollbackReport {
        journal.rollback(self.target)
    }

    fn execute(&self, gap: &DataGap, journal: &mut RunJournal) -> Result<FixOutcome> {
        let action = self.plan(gap)?;
        let before = match action.strategy {
            FixStrategy::Skip => None,
            _ => self.read_target(gap)?,
        };

        let (status, after) = match &action.operation {
            PlannedOperation::None => (FixStatus::Skipped, before.clone()),
            PlannedOperation::Write { record } if self.config.dry_run => {
                (FixStatus::DryRun, Some(record.clone()))
            }
            PlannedOperation::Delete { .. } if self.config.dry_run => (FixStatus::DryRun, None),
            PlannedOperation::Write { record } => {
                journal
                    .save(self.target, &gap.table, record, WriteOrigin::Fix)
                    .map_err(|e| store_error(gap, StoreSide::Target, e))?;
                (FixStatus::Applied, Some(record.clone()))
            }
            PlannedOperation::Delete { record_id } => {
                journal
                    .delete(self.target, &gap.table, record_id, WriteOrigin::Fix)
                    .map_err(|e| store_error(gap, StoreSide::Target, e))?;
                (FixStatus::Applied, None)
            }
        };

        debug!(table = %gap.table, record_id = %gap.record_id, strategy = %action.strategy, ?status, "fix evaluated");
        Ok(FixOutcome {
            action,
            status,
            error: None,
            before,
            after,
        })
    }

    fn compare_for_apply(&self, a: &DataGap, b: &DataGap) -> Ordering {
        let key = |gap: &DataGap| {
            let is_delete = FixStrategy::for_gap(gap.gap_type).is_delete();
            let pos = self.catalog.position(&gap.table).unwrap_or(usize::MAX);
            let pos = if is_delete { usize::MAX - pos } else { pos };
            (is_delete, pos, gap.gap_type)
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| a.record_id.cmp(&b.record_id))
    }

    fn read_source(&self, gap: &DataGap) -> Result<Option<Record>> {
        self.source
            .get(&gap.table, &gap.record_id)
            .map_err(|e| store_error(gap, StoreSide::Source, e))
    }

    fn read_target(&self, gap: &DataGap) -> Result<Option<Record>> {
        self.target
            .get(&gap.table, &gap.record_id)
            .map_err(|e| store_error(gap, StoreSide::Target, e))
    }
}

/// Target plus every field that is populated on the source and null or
/// absent on the target. Populated target fields are never touched.
fn additive_patch(source: &Record, target: &Record) -> Record {
    let mut patched = target.clone();
    for (field, value) in &source.data {
        if !value.is_null() && !target.is_populated(field) {
            patched.data.insert(field.clone(), value.clone());
        }
    }
    patched
}

fn fix_error(gap: &DataGap, message: &str) -> Error {
    Error::FixExecution {
        table: gap.table.clone(),
        record_id: gap.record_id.clone(),
        message: message.to_string(),
    }
}

fn store_error(gap: &DataGap, side: StoreSide, err: StoreError) -> Error {
    if err.is_connectivity() {
        Error::from_store(side, err)
    } else {
        fix_error(gap, &format!("{side}: {err}"))
    }
}
