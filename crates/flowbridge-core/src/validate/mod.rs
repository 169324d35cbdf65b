//! Structural and referential validation of batches.

mod result;
mod validator;

pub use result::{BatchScope, IssueCode, ValidationIssue, ValidationResult};
pub use validator::{DataValidator, StagedIds};
