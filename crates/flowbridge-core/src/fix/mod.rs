//! Automatic repair of detected gaps.
//!
//! | Gap type | Strategy |
//! |---|---|
//! | MISSING_RECORD | COPY_FROM_SOURCE |
//! | ORPHANED_RECORD | DELETE_FROM_TARGET |
//! | INCOMPLETE_MIGRATION | UPDATE_TARGET |
//! | VERSION_CONFLICT | MERGE_DATA |
//! | everything else | SKIP |

mod action;
mod engine;
mod merge;

pub use action::{FixAction, FixOutcome, FixStatus, FixStrategy, PlannedOperation};
pub use engine::{AutoFixEngine, FixConfig};
pub use merge::{merge_records, MergeTieBreak};
