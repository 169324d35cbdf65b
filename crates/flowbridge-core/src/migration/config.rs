//! Migration run configuration.

use crate::error::{Error, Result};
use crate::fix::{FixConfig, MergeTieBreak};
use crate::target::TargetConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Settings for one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Path of the SQLite source database.
    pub source_path: PathBuf,
    /// Target store settings.
    pub target: TargetConfig,
    /// Records per batch.
    pub batch_size: usize,
    /// Read and validate without writing to the target.
    pub dry_run: bool,
    /// Run a baseline and a post-migration gap check per table.
    pub enable_gap_detection: bool,
    /// Validate each batch before writing it.
    pub enable_validation: bool,
    /// Undo the run's writes when a table fails.
    pub enable_rollback: bool,
    /// Record failures and keep going instead of aborting the table.
    pub continue_on_error: bool,
    /// Tables to migrate; all catalog tables when `None`.
    pub tables: Option<Vec<String>>,
    /// Treat validation warnings as blocking.
    pub warnings_block: bool,
    /// Apply automatic fixes after the post-migration check.
    pub enable_auto_fix: bool,
    /// Merge behaviour on equal timestamps.
    pub merge_tie_break: MergeTieBreak,
    /// Longest wait for outstanding progress callbacks at the end of a run.
    pub progress_timeout: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("./flowbridge.db"),
            target: TargetConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            enable_gap_detection: true,
            enable_validation: true,
            enable_rollback: true,
            continue_on_error: false,
            tables: None,
            warnings_block: false,
            enable_auto_fix: false,
            merge_tie_break: MergeTieBreak::default(),
            progress_timeout: Duration::from_secs(5),
        }
    }
}

impl MigrationConfig {
    /// Create a configuration for a source database and target directory.
    pub fn new(source_path: impl Into<PathBuf>, target: TargetConfig) -> Self {
        Self {
            source_path: source_path.into(),
            target,
            ..Default::default()
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable or disable gap detection.
    pub fn with_gap_detection(mut self, enabled: bool) -> Self {
        self.enable_gap_detection = enabled;
        self
    }

    /// Enable or disable batch validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Enable or disable rollback on failure.
    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.enable_rollback = enabled;
        self
    }

    /// Set whether failures abort the table.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Restrict the run to some tables.
    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Treat warnings as blocking.
    pub fn with_warnings_block(mut self, warnings_block: bool) -> Self {
        self.warnings_block = warnings_block;
        self
    }

    /// Enable or disable the auto-fix pass.
    pub fn with_auto_fix(mut self, enabled: bool) -> Self {
        self.enable_auto_fix = enabled;
        self
    }

    /// Set the merge tie-break.
    pub fn with_merge_tie_break(mut self, tie_break: MergeTieBreak) -> Self {
        self.merge_tie_break = tie_break;
        self
    }

    /// Set the progress timeout.
    pub fn with_progress_timeout(mut self, timeout: Duration) -> Self {
        self.progress_timeout = timeout;
        self
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if matches!(&self.tables, Some(tables) if tables.is_empty()) {
            return Err(Error::Config("table list is empty".to_string()));
        }
        Ok(())
    }

    /// Settings for the fix engine used by the auto-fix pass.
    pub fn fix_config(&self) -> FixConfig {
        FixConfig::default()
            .with_dry_run(self.dry_run)
            .with_continue_on_error(self.continue_on_error)
            .with_merge_tie_break(self.merge_tie_break)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(config.enable_gap_detection && config.enable_validation && config.enable_rollback);
        assert!(!config.dry_run && !config.continue_on_error && !config.enable_auto_fix);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = MigrationConfig::default().with_batch_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        let config = MigrationConfig::default().with_tables(vec![]);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_fix_config_follows_run() {
        let config = MigrationConfig::default()
            .with_dry_run(true)
            .with_merge_tie_break(MergeTieBreak::PreferNonNull);
        let fix = config.fix_config();
        assert!(fix.dry_run);
        assert!(!fix.continue_on_error);
        assert_eq!(fix.merge_tie_break, MergeTieBreak::PreferNonNull);
    }
}
