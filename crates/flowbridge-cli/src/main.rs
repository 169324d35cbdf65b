//! Flowbridge command-line tool.

mod config;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use config::{Args, Command, DetectArgs, FixArgs, MigrateArgs, StoreArgs};
use flowbridge_core::{
    AutoFixEngine, CacheConfig, CachedTarget, Catalog, FixConfig, GapDetector, JsonReport,
    MigrationConfig, MigrationOrchestrator, RunJournal, SledTarget, SqliteSource,
};
use tracing::{info, warn};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flowbridge=info".parse().unwrap())
                .add_directive("flowbridge_core=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let result = match &args.command {
        Command::Migrate(migrate) => run_migrate(migrate),
        Command::Detect(detect) => run_detect(detect),
        Command::Fix(fix) => run_fix(fix),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Opened stores for one command.
struct Stores {
    catalog: Catalog,
    source: SqliteSource,
    target: CachedTarget<SledTarget>,
}

impl Stores {
    fn open(args: &StoreArgs) -> anyhow::Result<Self> {
        let catalog = Catalog::process_catalog();
        let source = SqliteSource::open(&args.source, &catalog)
            .with_context(|| format!("opening source {}", args.source.display()))?;
        let target = SledTarget::open(&args.target_config())
            .with_context(|| format!("opening target {}", args.target.display()))?;
        let cache = CacheConfig::default().with_capacity(args.record_cache);

        Ok(Self {
            catalog,
            source,
            target: CachedTarget::new(target, cache),
        })
    }

    fn close(&self) -> anyhow::Result<()> {
        let stats = self.target.cache().stats();
        info!(hits = stats.hits(), misses = stats.misses(), "record cache");
        self.target.inner().flush().context("flushing target")?;
        Ok(())
    }
}

fn run_migrate(args: &MigrateArgs) -> anyhow::Result<bool> {
    let config = MigrationConfig::from(args);
    let stores = Stores::open(&args.stores)?;
    info!(
        source = %config.source_path.display(),
        target = %config.target.path.display(),
        batch_size = config.batch_size,
        dry_run = config.dry_run,
        "Starting migration"
    );

    let mut orchestrator = MigrationOrchestrator::new(&stores.source, &stores.target, &stores.catalog, config)?
        .with_progress(|event| info!(table = %event.table, "{}", event.message));
    let result = orchestrator.run()?;

    emit(&result, args.report.as_deref())?;
    stores.close()?;
    if !result.is_success() {
        warn!(status = %result.status, errors = result.errors.len(), "migration did not complete");
    }
    Ok(result.is_success())
}

fn run_detect(args: &DetectArgs) -> anyhow::Result<bool> {
    let stores = Stores::open(&args.stores)?;
    let detector = GapDetector::new(&stores.source, &stores.target, &stores.catalog);
    let report = match args.stores.tables() {
        Some(tables) => detector.detect_tables(&table_refs(&tables))?,
        None => detector.detect_all_gaps()?,
    };

    emit(&report, args.report.as_deref())?;
    stores.close()?;
    info!(total = report.total_gaps, critical = report.critical_count(), "Detection finished");
    Ok(report.is_clean())
}

fn run_fix(args: &FixArgs) -> anyhow::Result<bool> {
    let stores = Stores::open(&args.stores)?;
    let engine = AutoFixEngine::new(&stores.source, &stores.target, &stores.catalog, FixConfig::from(args));

    let mut journal = RunJournal::new();
    let report = match args.stores.tables() {
        Some(tables) => engine.fix_tables(&table_refs(&tables), &mut journal)?,
        None => engine.fix_all(&mut journal)?,
    };

    emit(&report, args.report.as_deref())?;
    stores.close()?;
    if report.dry_run {
        info!(planned = report.dry_run_count, "Dry run, nothing written (use --apply)");
    }
    Ok(report.failed == 0 && !report.aborted)
}

fn table_refs(tables: &[String]) -> Vec<&str> {
    tables.iter().map(String::as_str).collect()
}

/// Save a report to `path`, or print it to stdout.
fn emit<R: JsonReport>(report: &R, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            report
                .save(path)
                .with_context(|| format!("writing report {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", report.to_json()?),
    }
    Ok(())
}
