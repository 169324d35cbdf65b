//! Run state machine.
//!
//! `pending → running → {completed | failed | rolled_back}`. Terminal states
//! are final; any other transition is rejected.

use crate::error::{Error, Result};
use crate::record::current_timestamp;
use serde::{Deserialize, Serialize};

/// Status of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not started.
    Pending,
    /// Tables being migrated.
    Running,
    /// Every table migrated cleanly.
    Completed,
    /// At least one table failed, or a rollback was incomplete.
    Failed,
    /// A failure was fully undone.
    RolledBack,
}

impl RunStatus {
    /// Whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::RolledBack)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match self {
            RunStatus::Pending => next == RunStatus::Running,
            RunStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run id.
    pub run_id: String,
    /// Current status.
    pub status: RunStatus,
    /// When the run started (microseconds since epoch).
    pub started_at: Option<u64>,
    /// When the run reached a terminal state (microseconds since epoch).
    pub completed_at: Option<u64>,
    /// Error message if the run failed.
    pub error: Option<String>,
}

impl RunState {
    /// Create a pending run.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Start the run.
    pub fn start(&mut self) -> Result<()> {
        self.transition(RunStatus::Running)?;
        self.started_at = Some(current_timestamp());
        Ok(())
    }

    /// Mark the run as completed.
    pub fn complete(&mut self) -> Result<()> {
        self.transition(RunStatus::Completed)
    }

    /// Mark the run as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Mark the run as rolled back.
    pub fn roll_back(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::RolledBack)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Duration in microseconds, once the run has finished.
    pub fn duration_micros(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }

    fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(current_timestamp());
        }
        Ok(())
    }
}

/// Generate a run id from the current time.
pub fn generate_run_id() -> String {
    let micros = current_timestamp();
    let hash = blake3::hash(&micros.to_le_bytes());
    format!("run-{micros}-{}", &hex::encode(hash.as_bytes())[..8])
}
