//! Core error types.

use thiserror::Error;

/// Errors reported by store adapters (source or target).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend accepted the call but failed to complete it.
    #[error("backend error: {0}")]
    Backend(String),

    /// Stored bytes could not be decoded.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    /// The table is not known to the store.
    #[error("unknown table: {0}")]
    UnknownTable(String),
}

impl StoreError {
    /// Whether this error means the store itself is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::NotADatabase
                ) =>
            {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        match &e {
            sled::Error::Io(_) => StoreError::Unavailable(e.to_string()),
            sled::Error::Corruption { .. } => StoreError::Corrupt(e.to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

/// Which side of the reconciliation a store sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSide {
    /// The authoritative relational origin.
    Source,
    /// The polyglot destination.
    Target,
}

impl std::fmt::Display for StoreSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreSide::Source => write!(f, "source"),
            StoreSide::Target => write!(f, "target"),
        }
    }
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A store was unreachable. Always fatal to the current operation.
    #[error("{side} store unreachable: {message}")]
    Connectivity {
        /// Which store failed.
        side: StoreSide,
        /// Underlying message.
        message: String,
    },

    /// A store call failed for a reason other than connectivity.
    #[error("{side} store error: {source}")]
    Store {
        /// Which store failed.
        side: StoreSide,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A batch failed validation.
    #[error("validation failed for {table} batch {batch_index}: {message}")]
    Validation {
        /// Table being validated.
        table: String,
        /// Zero-based batch index.
        batch_index: usize,
        /// Summary of the failures.
        message: String,
    },

    /// Gap detection could not complete for a table.
    #[error("gap detection failed for {table}: {message}")]
    GapDetection {
        /// Table being compared.
        table: String,
        /// Reason.
        message: String,
    },

    /// A single fix action failed.
    #[error("fix failed for {table}/{record_id}: {message}")]
    FixExecution {
        /// Table of the record.
        table: String,
        /// Record the action targeted.
        record_id: String,
        /// Reason.
        message: String,
    },

    /// One or more records could not be restored.
    #[error("rollback incomplete, {} record(s) not restored: {message}", unrestored.len())]
    Rollback {
        /// `table/id` of every record that could not be restored.
        unrestored: Vec<String>,
        /// First failure message.
        message: String,
    },

    /// The run state machine rejected a transition.
    #[error("invalid run state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// The run was cancelled at a batch boundary.
    #[error("run cancelled after {completed_batches} batch(es) of {table}")]
    Cancelled {
        /// Table in progress when cancellation took effect.
        table: String,
        /// Batches of that table already processed.
        completed_batches: usize,
    },

    /// Source rows without an id; they cannot be fetched or migrated.
    #[error("{count} source row(s) in {table} have no id")]
    MissingIds {
        /// Table holding the rows.
        table: String,
        /// Number of rows.
        count: usize,
    },

    /// A legacy process document could not be mapped onto records.
    #[error("invalid process document: {0}")]
    InvalidDocument(String),

    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A table is not described by the catalog.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a store error, routing connectivity failures to [`Error::Connectivity`].
    pub fn from_store(side: StoreSide, err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => Error::Connectivity { side, message },
            source => Error::Store { side, source },
        }
    }

    /// Short machine-readable kind, used in reports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connectivity { .. } => ErrorKind::Connectivity,
            Error::Store { .. } => ErrorKind::Store,
            Error::Validation { .. } | Error::MissingIds { .. } | Error::InvalidDocument(_) => {
                ErrorKind::Validation
            }
            Error::GapDetection { .. } => ErrorKind::GapDetection,
            Error::FixExecution { .. } => ErrorKind::FixExecution,
            Error::Rollback { .. } => ErrorKind::Rollback,
            Error::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Config(_) | Error::UnknownTable(_) => ErrorKind::Config,
            Error::Serialization(_) | Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error is a connectivity failure.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity { .. })
    }
}

/// Error classification recorded in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    Store,
    Validation,
    GapDetection,
    FixExecution,
    Rollback,
    InvalidTransition,
    Config,
    Io,
    Cancelled,
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
