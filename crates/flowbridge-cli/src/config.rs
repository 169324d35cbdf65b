//! Command line arguments and their mapping onto engine settings.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use flowbridge_core::{FixConfig, MergeTieBreak, MigrationConfig, TargetConfig};

/// Flowbridge migration and reconciliation tool.
#[derive(Debug, Parser)]
#[command(name = "flowbridge")]
#[command(version, about = "Migrate and reconcile process records between stores")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Migrate the source database into the target store.
    Migrate(MigrateArgs),
    /// Report gaps between source and target.
    Detect(DetectArgs),
    /// Repair auto-fixable gaps. Dry run unless --apply is given.
    Fix(FixArgs),
}

/// Store locations shared by every subcommand.
#[derive(Debug, Clone, ClapArgs)]
pub struct StoreArgs {
    /// SQLite source database.
    #[arg(short, long)]
    pub source: PathBuf,

    /// Target store directory.
    #[arg(short, long)]
    pub target: PathBuf,

    /// Restrict to these tables (repeatable).
    #[arg(long = "table")]
    pub tables: Vec<String>,

    /// Target page cache size in MB.
    #[arg(long, default_value_t = 256)]
    pub target_cache_mb: u64,

    /// Records kept in the read cache in front of the target.
    #[arg(long, default_value_t = 1024)]
    pub record_cache: usize,
}

impl StoreArgs {
    pub fn target_config(&self) -> TargetConfig {
        TargetConfig::new(&self.target).with_cache_capacity(self.target_cache_mb * 1024 * 1024)
    }

    pub fn tables(&self) -> Option<Vec<String>> {
        (!self.tables.is_empty()).then(|| self.tables.clone())
    }
}

#[derive(Debug, ClapArgs)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub stores: StoreArgs,

    /// Records per batch.
    #[arg(short, long, default_value_t = flowbridge_core::migration::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Read and validate without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the migration result here instead of stdout.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Skip the baseline and post-migration gap checks.
    #[arg(long)]
    pub no_gap_detection: bool,

    /// Skip batch validation.
    #[arg(long)]
    pub no_validation: bool,

    /// Leave writes in place when a table fails.
    #[arg(long)]
    pub no_rollback: bool,

    /// Record failures and keep going.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Treat validation warnings as errors.
    #[arg(long)]
    pub warnings_block: bool,

    /// Repair auto-fixable gaps after migrating.
    #[arg(long)]
    pub auto_fix: bool,

    /// On equal timestamps, fill target nulls from the source.
    #[arg(long)]
    pub prefer_non_null: bool,

    /// Longest wait (ms) for progress output at the end of the run.
    #[arg(long, default_value_t = 5_000)]
    pub progress_timeout_ms: u64,
}

#[derive(Debug, ClapArgs)]
pub struct DetectArgs {
    #[command(flatten)]
    pub stores: StoreArgs,

    /// Write the gap report here instead of stdout.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, ClapArgs)]
pub struct FixArgs {
    #[command(flatten)]
    pub stores: StoreArgs,

    /// Commit the fixes.
    #[arg(long)]
    pub apply: bool,

    /// Stop at the first failed fix.
    #[arg(long)]
    pub stop_on_error: bool,

    /// On equal timestamps, fill target nulls from the source.
    #[arg(long)]
    pub prefer_non_null: bool,

    /// Write the fix report here instead of stdout.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

fn tie_break(prefer_non_null: bool) -> MergeTieBreak {
    if prefer_non_null {
        MergeTieBreak::PreferNonNull
    } else {
        MergeTieBreak::PreferTarget
    }
}

impl From<&MigrateArgs> for MigrationConfig {
    fn from(args: &MigrateArgs) -> Self {
        let mut config = MigrationConfig::new(&args.stores.source, args.stores.target_config())
            .with_batch_size(args.batch_size)
            .with_dry_run(args.dry_run)
            .with_gap_detection(!args.no_gap_detection)
            .with_validation(!args.no_validation)
            .with_rollback(!args.no_rollback)
            .with_continue_on_error(args.continue_on_error)
            .with_warnings_block(args.warnings_block)
            .with_auto_fix(args.auto_fix)
            .with_merge_tie_break(tie_break(args.prefer_non_null))
            .with_progress_timeout(Duration::from_millis(args.progress_timeout_ms));
        if let Some(tables) = args.stores.tables() {
            config = config.with_tables(tables);
        }
        config
    }
}

impl From<&FixArgs> for FixConfig {
    fn from(args: &FixArgs) -> Self {
        FixConfig::default()
            .with_dry_run(!args.apply)
            .with_continue_on_error(!args.stop_on_error)
            .with_merge_tie_break(tie_break(args.prefer_non_null))
    }
}
