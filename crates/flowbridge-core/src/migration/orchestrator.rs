//! End-to-end migration driver.
//!
//! Tables run in dependency order and batches run strictly one after another,
//! so the journal always reflects a prefix of the planned writes.

use super::config::MigrationConfig;
use super::progress::{CancellationToken, ProgressCallback, ProgressEvent, ProgressReporter};
use super::result::{ErrorEntry, MigrationResult, TableResult, TableStatus};
use super::state::{generate_run_id, RunState};
use crate::catalog::{Catalog, TableDef};
use crate::detect::{DataGap, GapDetector};
use crate::error::{Error, Result, StoreSide};
use crate::fix::{AutoFixEngine, FixStatus};
use crate::journal::{RunJournal, WriteOrigin};
use crate::record::Record;
use crate::source::SourceStore;
use crate::target::TargetStore;
use crate::validate::{BatchScope, DataValidator, StagedIds};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Mutable state threaded through one run.
struct RunContext {
    journal: RunJournal,
    staged: StagedIds,
    reporter: ProgressReporter,
    result: MigrationResult,
}

/// Drives a migration run from source to target.
pub struct MigrationOrchestrator<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    catalog: Catalog,
    tables: Vec<String>,
    config: MigrationConfig,
    state: RunState,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl<'a> MigrationOrchestrator<'a> {
    /// Create an orchestrator for one run.
    ///
    /// The target must not be written by anything else while the run is in
    /// progress; this is not enforced.
    pub fn new(
        source: &'a dyn SourceStore,
        target: &'a dyn TargetStore,
        catalog: &Catalog,
        config: MigrationConfig,
    ) -> Result<Self> {
        config.validate()?;
        catalog.validate()?;
        // The full catalog stays in use so references into unselected tables still resolve.
        let tables = match &config.tables {
            Some(selected) => catalog.subset(selected)?.tables,
            None => catalog.tables.clone(),
        }
        .into_iter()
        .map(|t| t.name)
        .collect();

        Ok(Self {
            source,
            target,
            catalog: catalog.clone(),
            tables,
            config,
            state: RunState::new(generate_run_id()),
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Receive a progress event after every batch.
    ///
    /// The callback runs on its own thread and never delays the run.
    pub fn with_progress(mut self, callback: impl Fn(&ProgressEvent) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Use an externally created cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this run at the next batch boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current run state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Tables this run covers, in the order they are migrated.
    pub fn tables(&self) -> Vec<&str> {
        self.tables.iter().map(String::as_str).collect()
    }

    /// Execute the run.
    ///
    /// Failures during the run are reported in the result; `Err` means the run
    /// could not start (it was already run).
    #[instrument(skip(self), fields(run_id = %self.state.run_id))]
    pub fn run(&mut self) -> Result<MigrationResult> {
        self.state.start()?;

        let reporter = match self.progress.take() {
            Some(callback) => ProgressReporter::spawn(callback, self.config.progress_timeout),
            None => ProgressReporter::disabled(),
        };
        let mut ctx = RunContext {
            journal: RunJournal::new(),
            staged: StagedIds::new(),
            reporter,
            result: MigrationResult::new(&self.state.run_id, &self.config),
        };
        ctx.result.status = self.state.status;

        info!(
            tables = ?self.tables,
            batch_size = self.config.batch_size,
            dry_run = self.config.dry_run,
            "migration started"
        );

        let mut failure = None;
        let selected = self
            .catalog
            .tables
            .iter()
            .filter(|t| self.tables.contains(&t.name));
        for def in selected {
            let mut table = TableResult::new(&def.name);
            if let Err(e) = self.migrate_table(def, &mut table, &mut ctx) {
                warn!(table = %def.name, error = %e, "table failed");
                ctx.result.errors.push(ErrorEntry::from_error(&e, Some(&def.name)));
                table.status = TableStatus::Failed;
                failure = Some(e);
            }
            ctx.result.total_records += table.source_records;
            ctx.result.migrated_records += table.migrated_records;
            ctx.result.tables.push(table);
            if failure.is_some() {
                break;
            }
        }

        if failure.is_none() && self.config.enable_auto_fix {
            if let Err(e) = self.auto_fix(&mut ctx) {
                ctx.result.errors.push(ErrorEntry::from_error(&e, None));
                failure = Some(e);
            }
        }

        match failure {
            Some(err) => self.finish_failed(err, &mut ctx)?,
            None => {
                let critical = ctx.result.new_critical_gaps.len();
                if ctx.result.errors.is_empty() && critical == 0 {
                    self.state.complete()?;
                } else {
                    self.state.fail(format!(
                        "{} error(s), {critical} new critical gap(s)",
                        ctx.result.errors.len()
                    ))?;
                }
            }
        }

        let RunContext {
            reporter,
            mut result,
            ..
        } = ctx;
        result.progress = reporter.finish();
        result.status = self.state.status;
        result.duration_ms = self.state.duration_micros().map_or(0, |us| us / 1000);

        info!(
            status = %result.status,
            migrated = result.migrated_records,
            total = result.total_records,
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "migration finished"
        );
        Ok(result)
    }

    fn migrate_table(&self, def: &TableDef, table: &mut TableResult, ctx: &mut RunContext) -> Result<()> {
        let detector = GapDetector::new(self.source, self.target, &self.catalog);
        let validator = DataValidator::new(&self.catalog);

        let baseline = if self.config.enable_gap_detection {
            let gaps = detector.detect_table(&def.name)?;
            table.baseline_gaps = gaps.len();
            Some(gaps)
        } else {
            None
        };

        let ids = self
            .source
            .list_ids(&def.name)
            .map_err(|e| Error::from_store(StoreSide::Source, e))?;
        let null_ids = self
            .source
            .count_null_ids(&def.name)
            .map_err(|e| Error::from_store(StoreSide::Source, e))?;
        table.source_records = ids.len() + null_ids;
        table.null_id_records = null_ids;
        if null_ids > 0 {
            let err = Error::MissingIds {
                table: def.name.clone(),
                count: null_ids,
            };
            warn!(table = %def.name, count = null_ids, "source rows without an id cannot be migrated");
            ctx.result.errors.push(ErrorEntry::from_error(&err, Some(&def.name)));
        }
        let total_batches = ids.len().div_ceil(self.config.batch_size);
        debug!(table = %def.name, records = ids.len(), total_batches, "migrating table");

        for (batch_index, chunk) in ids.chunks(self.config.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    table: def.name.clone(),
                    completed_batches: batch_index,
                });
            }

            let records = self
                .source
                .get_many(&def.name, chunk)
                .map_err(|e| Error::from_store(StoreSide::Source, e))?;
            table.batches += 1;
            table.batch_sizes.push(records.len());

            if self.config.enable_validation {
                let scope = BatchScope::batch(&def.name, batch_index, records.len());
                let check = validator.validate_batch(scope, &records, &ctx.staged, self.target)?;
                let blocked = check.blocks(self.config.warnings_block);
                let summary = check.summary();
                ctx.result.push_validation(check);

                if blocked {
                    table.failed_batches.push(batch_index);
                    let err = Error::Validation {
                        table: def.name.clone(),
                        batch_index,
                        message: summary,
                    };
                    if !self.config.continue_on_error {
                        return Err(err);
                    }
                    warn!(table = %def.name, batch_index, error = %err, "batch skipped");
                    ctx.result.errors.push(ErrorEntry::from_error(&err, Some(&def.name)));
                    self.report(ctx, def, batch_index, total_batches, table, "batch skipped: validation failed");
                    continue;
                }
            }

            if !self.config.dry_run {
                let written = self.write_batch(def, batch_index, &records, table, ctx)?;
                table.migrated_records += written.len();

                if self.config.enable_validation {
                    let check = validator.validate_migrated(&def.name, &written, self.target)?;
                    let valid = check.is_valid;
                    let summary = check.summary();
                    ctx.result.push_validation(check);
                    if !valid {
                        let err = Error::Validation {
                            table: def.name.clone(),
                            batch_index,
                            message: summary,
                        };
                        if !table.failed_batches.contains(&batch_index) {
                            table.failed_batches.push(batch_index);
                        }
                        if !self.config.continue_on_error {
                            return Err(err);
                        }
                        ctx.result.errors.push(ErrorEntry::from_error(&err, Some(&def.name)));
                    }
                }
            }

            ctx.staged.stage(&def.name, records.iter().map(|r| r.id.as_str()));
            self.report(ctx, def, batch_index, total_batches, table, "batch processed");
            debug!(table = %def.name, batch_index, size = records.len(), "batch done");
        }

        if let Some(baseline) = baseline {
            let post = if self.config.dry_run {
                baseline.clone()
            } else {
                detector.detect_table(&def.name)?
            };
            table.post_gaps = post.len();

            let introduced = new_critical_gaps(&baseline, &post);
            if !introduced.is_empty() {
                warn!(table = %def.name, count = introduced.len(), "migration introduced critical gaps");
                ctx.result.new_critical_gaps.extend(introduced);
            }
            ctx.result.gaps.extend(post);
        }

        let has_new_critical = ctx
            .result
            .new_critical_gaps
            .iter()
            .any(|g| g.table == def.name);
        table.status = if table.failed_batches.is_empty() && !has_new_critical && null_ids == 0 {
            TableStatus::Completed
        } else {
            TableStatus::Partial
        };
        info!(table = %def.name, status = ?table.status, migrated = table.migrated_records, "table finished");
        Ok(())
    }

    /// Write one batch through the journal. Returns the records written.
    fn write_batch(
        &self,
        def: &TableDef,
        batch_index: usize,
        records: &[Record],
        table: &mut TableResult,
        ctx: &mut RunContext,
    ) -> Result<Vec<Record>> {
        let mut written = Vec::with_capacity(records.len());
        for record in records {
            match ctx
                .journal
                .save(self.target, &def.name, record, WriteOrigin::Migration)
            {
                Ok(()) => written.push(record.clone()),
                Err(e) => {
                    let err = Error::from_store(StoreSide::Target, e);
                    if err.is_connectivity() || !self.config.continue_on_error {
                        table.failed_batches.push(batch_index);
                        return Err(err);
                    }
                    warn!(table = %def.name, record_id = %record.id, error = %err, "record write failed");
                    ctx.result.errors.push(
                        ErrorEntry::from_error(&err, Some(&def.name))
                            .in_batch(batch_index)
                            .for_record(&record.id),
                    );
                    if !table.failed_batches.contains(&batch_index) {
                        table.failed_batches.push(batch_index);
                    }
                }
            }
        }
        Ok(written)
    }

    fn auto_fix(&self, ctx: &mut RunContext) -> Result<()> {
        let engine = AutoFixEngine::new(self.source, self.target, &self.catalog, self.config.fix_config());
        let fixable: Vec<DataGap> = ctx.result.gaps.iter().filter(|g| g.auto_fixable).cloned().collect();
        let report = engine.apply(&fixable, &mut ctx.journal)?;

        for outcome in report.with_status(FixStatus::Failed) {
            let gap = &outcome.action.gap;
            ctx.result.errors.push(ErrorEntry::from_error(
                &Error::FixExecution {
                    table: gap.table.clone(),
                    record_id: gap.record_id.clone(),
                    message: outcome.error.clone().unwrap_or_default(),
                },
                Some(&gap.table),
            ));
        }
        ctx.result.fixes = Some(report);
        Ok(())
    }

    fn finish_failed(&mut self, err: Error, ctx: &mut RunContext) -> Result<()> {
        let cancelled = matches!(err, Error::Cancelled { .. });
        if cancelled || !self.config.enable_rollback || ctx.journal.is_empty() {
            return self.state.fail(err.to_string());
        }

        warn!(writes = ctx.journal.len(), "rolling back run");
        let report = ctx.journal.rollback(self.target);
        if report.is_complete() {
            for table in &mut ctx.result.tables {
                if table.migrated_records > 0 || table.status == TableStatus::Failed {
                    table.status = TableStatus::RolledBack;
                }
            }
            ctx.result.rollback = Some(report);
            self.state.roll_back(err.to_string())
        } else {
            let rollback_err = Error::Rollback {
                unrestored: report.unrestored.clone(),
                message: report.errors.first().cloned().unwrap_or_default(),
            };
            ctx.result.errors.push(ErrorEntry::from_error(&rollback_err, None));
            ctx.result.rollback = Some(report);
            self.state.fail(rollback_err.to_string())
        }
    }

    fn report(
        &self,
        ctx: &mut RunContext,
        def: &TableDef,
        batch_index: usize,
        total_batches: usize,
        table: &TableResult,
        message: &str,
    ) {
        ctx.reporter.report(ProgressEvent {
            table: def.name.clone(),
            batch_index,
            total_batches,
            records_processed: table.batch_sizes.iter().sum(),
            message: format!("{}: {message} ({}/{total_batches})", def.name, batch_index + 1),
        });
    }
}

/// Critical gaps in `post` with no critical counterpart in `baseline`.
fn new_critical_gaps(baseline: &[DataGap], post: &[DataGap]) -> Vec<DataGap> {
    let known: HashSet<_> = baseline
        .iter()
        .filter(|g| g.is_critical())
        .map(|g| (g.gap_type, g.record_id.as_str()))
        .collect();
    post.iter()
        .filter(|g| g.is_critical() && !known.contains(&(g.gap_type, g.record_id.as_str())))
        .cloned()
        .collect()
}
