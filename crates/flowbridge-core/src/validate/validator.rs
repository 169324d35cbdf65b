//! Batch validation.

use super::result::{BatchScope, IssueCode, ValidationIssue, ValidationResult};
use crate::catalog::{Catalog, FieldKind, TableDef};
use crate::detect::{is_unparseable_json, reference_id};
use crate::error::{Error, Result, StoreSide};
use crate::record::{is_valid_identifier, Record};
use crate::target::TargetStore;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Ids already written (or staged for writing) during the current run.
#[derive(Debug, Clone, Default)]
pub struct StagedIds {
    by_table: HashMap<String, HashSet<String>>,
}

impl StagedIds {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ids as staged.
    pub fn stage<'r>(&mut self, table: &str, ids: impl IntoIterator<Item = &'r str>) {
        self.by_table
            .entry(table.to_string())
            .or_default()
            .extend(ids.into_iter().map(str::to_string));
    }

    /// Whether an id was staged.
    pub fn contains(&self, table: &str, id: &str) -> bool {
        self.by_table.get(table).is_some_and(|ids| ids.contains(id))
    }
}

/// Validates batches before they are written and tables after.
///
/// Never mutates either store.
pub struct DataValidator<'a> {
    catalog: &'a Catalog,
}

impl<'a> DataValidator<'a> {
    /// Create a validator.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Record counts must match.
    pub fn validate_count(&self, scope: BatchScope, expected: usize, actual: usize) -> ValidationResult {
        let mut result = ValidationResult::new(scope);
        if expected != actual {
            result.error(ValidationIssue::new(
                IssueCode::CountMismatch,
                format!("expected {expected} record(s), found {actual}"),
            ));
        }
        result
    }

    /// Id sets must match.
    pub fn validate_ids(&self, scope: BatchScope, expected: &[String], actual: &[String]) -> ValidationResult {
        let mut result = ValidationResult::new(scope);
        let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
        let actual: BTreeSet<&str> = actual.iter().map(String::as_str).collect();

        for id in expected.difference(&actual) {
            result.error(
                ValidationIssue::new(IssueCode::MissingId, format!("{id} missing"))
                    .for_record(*id),
            );
        }
        for id in actual.difference(&expected) {
            result.error(
                ValidationIssue::new(IssueCode::ExtraId, format!("{id} unexpected"))
                    .for_record(*id),
            );
        }
        result
    }

    /// Records expected unchanged must hash identically.
    ///
    /// Records absent from `actual` are left to [`Self::validate_ids`].
    pub fn validate_checksums(&self, scope: BatchScope, expected: &[Record], actual: &[Record]) -> ValidationResult {
        let mut result = ValidationResult::new(scope);
        let actual: HashMap<&str, &Record> = actual.iter().map(|r| (r.id.as_str(), r)).collect();

        for record in expected {
            if let Some(other) = actual.get(record.id.as_str()) {
                if record.checksum() != other.checksum() {
                    result.error(
                        ValidationIssue::new(
                            IssueCode::ChecksumMismatch,
                            format!("{} content differs", record.id),
                        )
                        .for_record(&record.id),
                    );
                }
            }
        }
        result
    }

    /// Top-level structure of each record.
    pub fn validate_structure(&self, scope: BatchScope, records: &[Record]) -> Result<ValidationResult> {
        let table = self.catalog.require_table(&scope.table)?;
        let mut result = ValidationResult::new(scope);

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.id.as_str()) {
                result.error(
                    ValidationIssue::new(IssueCode::DuplicateId, format!("{} appears twice", record.id))
                        .for_record(&record.id),
                );
            }
            if !is_valid_identifier(&record.id) {
                result.error(
                    ValidationIssue::new(IssueCode::MalformedId, format!("malformed id '{}'", record.id))
                        .for_record(&record.id),
                );
            }
            check_fields(table, record, &mut result);
        }
        Ok(result)
    }

    /// Every foreign key must resolve within the batch, among ids staged
    /// earlier in the run, or in the target.
    pub fn validate_references(
        &self,
        scope: BatchScope,
        records: &[Record],
        staged: &StagedIds,
        target: &dyn TargetStore,
    ) -> Result<ValidationResult> {
        let table = self.catalog.require_table(&scope.table)?;
        let mut result = ValidationResult::new(scope);
        let in_batch: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let mut in_target: BTreeMap<(String, String), bool> = BTreeMap::new();

        for record in records {
            for fk in self.catalog.foreign_keys_for(&table.name) {
                let Some(ref_id) = record.get(&fk.field).and_then(reference_id) else {
                    continue;
                };
                if fk.references == table.name && in_batch.contains(ref_id.as_str()) {
                    continue;
                }
                if staged.contains(&fk.references, &ref_id) {
                    continue;
                }

                let key = (fk.references.clone(), ref_id);
                let exists = match in_target.get(&key) {
                    Some(exists) => *exists,
                    None => {
                        let exists = target
                            .get(&key.0, &key.1)
                            .map_err(|e| Error::from_store(StoreSide::Target, e))?
                            .is_some();
                        in_target.insert(key.clone(), exists);
                        exists
                    }
                };
                if !exists {
                    result.error(
                        ValidationIssue::new(
                            IssueCode::UnresolvedReference,
                            format!("{}.{} -> {}/{} does not resolve", record.id, fk.field, key.0, key.1),
                        )
                        .for_record(&record.id)
                        .on_field(&fk.field),
                    );
                }
            }
        }
        Ok(result)
    }

    /// Structure and reference checks for a batch about to be written.
    pub fn validate_batch(
        &self,
        scope: BatchScope,
        records: &[Record],
        staged: &StagedIds,
        target: &dyn TargetStore,
    ) -> Result<ValidationResult> {
        let mut result = self.validate_structure(scope.clone(), records)?;
        result.merge(self.validate_references(scope, records, staged, target)?);
        Ok(result)
    }

    /// Count, id and checksum checks of records after they were written.
    ///
    /// Only the ids in `written` are looked up; other target records are the
    /// detector's concern.
    pub fn validate_migrated(
        &self,
        table: &str,
        written: &[Record],
        target: &dyn TargetStore,
    ) -> Result<ValidationResult> {
        self.catalog.require_table(table)?;
        let mut stored = Vec::with_capacity(written.len());
        for record in written {
            if let Some(found) = target
                .get(table, &record.id)
                .map_err(|e| Error::from_store(StoreSide::Target, e))?
            {
                stored.push(found);
            }
        }

        let expected_ids: Vec<String> = written.iter().map(|r| r.id.clone()).collect();
        let stored_ids: Vec<String> = stored.iter().map(|r| r.id.clone()).collect();
        let scope = BatchScope::table(table, written.len());

        let mut result = self.validate_count(scope.clone(), expected_ids.len(), stored_ids.len());
        result.merge(self.validate_ids(scope.clone(), &expected_ids, &stored_ids));
        result.merge(self.validate_checksums(scope, written, &stored));
        Ok(result)
    }
}

fn check_fields(table: &TableDef, record: &Record, result: &mut ValidationResult) {
    for field in &table.fields {
        match record.get(&field.name) {
            None if field.required => result.error(missing_required(record, &field.name)),
            Some(value) if value.is_null() && field.required => {
                result.error(missing_required(record, &field.name))
            }
            None => result.warn(
                ValidationIssue::new(
                    IssueCode::MissingOptionalField,
                    format!("{} has no '{}'", record.id, field.name),
                )
                .for_record(&record.id)
                .on_field(&field.name),
            ),
            Some(value) if field.kind == FieldKind::Json && is_unparseable_json(value) => {
                result.error(
                    ValidationIssue::new(
                        IssueCode::InvalidJson,
                        format!("{}.{} is not valid JSON", record.id, field.name),
                    )
                    .for_record(&record.id)
                    .on_field(&field.name),
                )
            }
            Some(_) => {}
        }
    }

    for key in record.data.keys() {
        if !table.declares(key) {
            result.warn(
                ValidationIssue::new(
                    IssueCode::UnknownField,
                    format!("{} has undeclared field '{key}'", record.id),
                )
                .for_record(&record.id)
                .on_field(key),
            );
        }
    }
}

fn missing_required(record: &Record, field: &str) -> ValidationIssue {
    ValidationIssue::new(
        IssueCode::MissingRequiredField,
        format!("{} is missing required '{field}'", record.id),
    )
    .for_record(&record.id)
    .on_field(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MemoryTarget;
    use serde_json::json;

    fn element(id: &str, process: &str) -> Record {
        Record::with_id(id)
            .with_field("process_id", process)
            .with_field("element_type", "task")
            .with_field("name", json!(null))
            .with_field("properties", json!(null))
            .with_field("position", json!(null))
            .with_field("updated_at", json!(null))
    }

    #[test]
    fn test_structure_errors_and_warnings() {
        let catalog = Catalog::process_catalog();
        let validator = DataValidator::new(&catalog);

        let mut partial = Record::with_id("e2")
            .with_field("process_id", "p1")
            .with_field("element_type", json!(null))
            .with_field("properties", "{oops")
            .with_field("colour", "red");
        partial.data.remove("position");

        let records = vec![element("e1", "p1"), element("e1", "p1"), partial];
        let result = validator
            .validate_structure(BatchScope::batch("elements", 0, 3), &records)
            .unwrap();

        let codes: Vec<_> = result.errors.iter().map(|i| i.code).collect();
        assert!(codes.contains(&IssueCode::DuplicateId));
        assert!(codes.contains(&IssueCode::MissingRequiredField));
        assert!(codes.contains(&IssueCode::InvalidJson));
        assert_eq!(result.errors.len(), 3);

        let warnings: Vec<_> = result.warnings.iter().map(|i| i.code).collect();
        assert!(warnings.contains(&IssueCode::UnknownField));
        assert!(warnings.contains(&IssueCode::MissingOptionalField));
        assert!(!result.is_valid);
    }

    #[test]
    fn test_clean_batch_is_valid() {
        let catalog = Catalog::process_catalog();
        let validator = DataValidator::new(&catalog);
        let result = validator
            .validate_structure(BatchScope::batch("elements", 0, 1), &[element("e1", "p1")])
            .unwrap();
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_reference_resolution_sources() {
        let catalog = Catalog::process_catalog();
        let validator = DataValidator::new(&catalog);
        let target = MemoryTarget::new();
        target.save("processes", &Record::with_id("p-target")).unwrap();
        let mut staged = StagedIds::new();
        staged.stage("processes", ["p-staged"]);

        let records = vec![
            element("e1", "p-target"),
            element("e2", "p-staged"),
            element("e3", "p-nowhere"),
        ];
        let result = validator
            .validate_references(BatchScope::batch("elements", 0, 3), &records, &staged, &target)
            .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].record_id.as_deref(), Some("e3"));
        assert_eq!(result.errors[0].code, IssueCode::UnresolvedReference);
    }

    #[test]
    fn test_validate_migrated() {
        let catalog = Catalog::process_catalog();
        let validator = DataValidator::new(&catalog);
        let target = MemoryTarget::new();
        let written = vec![
            Record::with_id("p1").with_field("name", "a"),
            Record::with_id("p2").with_field("name", "b"),
            Record::with_id("p4").with_field("name", "d"),
        ];
        target.save("processes", &written[0]).unwrap();
        target
            .save("processes", &Record::with_id("p2").with_field("name", "changed"))
            .unwrap();
        // Unrelated target records do not count.
        target.save("processes", &Record::with_id("p3")).unwrap();

        let result = validator.validate_migrated("processes", &written, &target).unwrap();
        let codes: Vec<_> = result.errors.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![IssueCode::CountMismatch, IssueCode::MissingId, IssueCode::ChecksumMismatch]
        );
        assert_eq!(result.errors[1].record_id.as_deref(), Some("p4"));
    }
}
