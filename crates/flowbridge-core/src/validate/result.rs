//! Validation outcomes.

use serde::{Deserialize, Serialize};

/// What a validation issue is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    CountMismatch,
    MissingId,
    ExtraId,
    ChecksumMismatch,
    DuplicateId,
    MalformedId,
    MissingRequiredField,
    MissingOptionalField,
    UnknownField,
    InvalidJson,
    UnresolvedReference,
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Classification.
    pub code: IssueCode,
    /// Record concerned, if any.
    pub record_id: Option<String>,
    /// Field concerned, if any.
    pub field: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl ValidationIssue {
    /// Create an issue not tied to a record.
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            record_id: None,
            field: None,
            message: message.into(),
        }
    }

    /// Attach the record id.
    pub fn for_record(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Attach the field name.
    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// The batch a validation ran over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchScope {
    /// Table name.
    pub table: String,
    /// Zero-based batch index; `None` for whole-table checks.
    pub batch_index: Option<usize>,
    /// Records examined.
    pub record_count: usize,
}

impl BatchScope {
    /// Scope of one batch.
    pub fn batch(table: impl Into<String>, batch_index: usize, record_count: usize) -> Self {
        Self {
            table: table.into(),
            batch_index: Some(batch_index),
            record_count,
        }
    }

    /// Scope of a whole table.
    pub fn table(table: impl Into<String>, record_count: usize) -> Self {
        Self {
            table: table.into(),
            batch_index: None,
            record_count,
        }
    }
}

/// Errors and warnings for one scope.
///
/// `is_valid` is true exactly when there are no errors; warnings never make a
/// result invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub scope: BatchScope,
}

impl ValidationResult {
    /// An empty, valid result.
    pub fn new(scope: BatchScope) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            scope,
        }
    }

    /// Record an error.
    pub fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
        self.is_valid = false;
    }

    /// Record a warning.
    pub fn warn(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Fold another result over the same scope into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.is_valid = self.errors.is_empty();
    }

    /// Whether the result should stop a write.
    pub fn blocks(&self, warnings_block: bool) -> bool {
        !self.is_valid || (warnings_block && !self.warnings.is_empty())
    }

    /// One-line summary of the errors (or warnings when there are none).
    pub fn summary(&self) -> String {
        let issues = if self.errors.is_empty() {
            &self.warnings
        } else {
            &self.errors
        };
        let mut parts: Vec<String> = issues.iter().take(3).map(|i| i.message.clone()).collect();
        if issues.len() > 3 {
            parts.push(format!("and {} more", issues.len() - 3));
        }
        format!(
            "{} error(s), {} warning(s): {}",
            self.errors.len(),
            self.warnings.len(),
            parts.join("; ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_keep_result_valid() {
        let mut result = ValidationResult::new(BatchScope::batch("processes", 0, 2));
        result.warn(ValidationIssue::new(IssueCode::UnknownField, "extra key"));
        assert!(result.is_valid);
        assert!(!result.blocks(false));
        assert!(result.blocks(true));

        result.error(ValidationIssue::new(IssueCode::DuplicateId, "dup").for_record("p1"));
        assert!(!result.is_valid);
        assert!(result.blocks(false));
        assert!(result.summary().starts_with("1 error(s), 1 warning(s): dup"));
    }

    #[test]
    fn test_merge() {
        let mut a = ValidationResult::new(BatchScope::table("elements", 3));
        let mut b = ValidationResult::new(BatchScope::table("elements", 3));
        b.error(ValidationIssue::new(IssueCode::MissingId, "e2 missing"));
        a.merge(b);
        assert!(!a.is_valid);
        assert_eq!(a.errors.len(), 1);
    }
}
