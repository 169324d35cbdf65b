//! Migration runs.
//!
//! A [`MigrationOrchestrator`] moves every catalog table from the source to
//! the target in batches, validating each batch, checking for gaps before
//! and after each table, and undoing its writes when a table fails.

mod config;
mod orchestrator;
mod progress;
mod result;
mod state;

pub use config::{MigrationConfig, DEFAULT_BATCH_SIZE};
pub use orchestrator::MigrationOrchestrator;
pub use progress::{CancellationToken, ProgressCallback, ProgressEvent, ProgressReporter, ProgressStats};
pub use result::{ErrorEntry, MigrationResult, TableResult, TableStatus};
pub use state::{generate_run_id, RunState, RunStatus};
