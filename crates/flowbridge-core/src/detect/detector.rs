//! Source/target comparison.

use super::checks::{corruption_issues, reference_id, same_value};
use super::gap::{DataGap, GapType, Severity};
use super::report::GapReport;
use crate::catalog::{Catalog, TableDef};
use crate::error::{Error, Result, StoreError, StoreSide};
use crate::record::Record;
use crate::source::SourceStore;
use crate::target::TargetStore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, instrument, warn};

/// Records fetched per source round trip.
const LOAD_CHUNK: usize = 500;

type GapKey = (GapType, String);

/// Compares source and target and classifies every divergence.
///
/// Detection is read-only: running it twice against unchanged stores yields
/// the same list.
pub struct GapDetector<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    catalog: &'a Catalog,
}

impl<'a> GapDetector<'a> {
    /// Create a detector over a store pair.
    pub fn new(
        source: &'a dyn SourceStore,
        target: &'a dyn TargetStore,
        catalog: &'a Catalog,
    ) -> Self {
        Self {
            source,
            target,
            catalog,
        }
    }

    /// Detect gaps in every catalog table.
    pub fn detect_all_gaps(&self) -> Result<GapReport> {
        self.detect_tables(&self.catalog.table_names())
    }

    /// Detect gaps in the named tables, visited in catalog order.
    ///
    /// Foreign keys are still resolved against the whole catalog. A table whose
    /// detection fails is listed in the report's `table_errors`; a connectivity
    /// failure aborts the whole pass.
    #[instrument(skip(self))]
    pub fn detect_tables(&self, tables: &[&str]) -> Result<GapReport> {
        for name in tables {
            self.catalog.require_table(name)?;
        }
        let selected: Vec<&str> = self
            .catalog
            .table_names()
            .into_iter()
            .filter(|name| tables.contains(name))
            .collect();

        let mut gaps = Vec::new();
        let mut table_errors = BTreeMap::new();
        for &table in &selected {
            match self.detect_table(table) {
                Ok(found) => gaps.extend(found),
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    warn!(table, error = %e, "gap detection failed");
                    table_errors.insert(table.to_string(), e.to_string());
                }
            }
        }

        let report = GapReport::new(selected, gaps, table_errors);
        info!(total = report.total_gaps, critical = report.critical_count(), "gap detection complete");
        Ok(report)
    }

    /// Detect gaps in one table, ordered by gap type then record id.
    pub fn detect_table(&self, table: &str) -> Result<Vec<DataGap>> {
        let def = self.catalog.require_table(table)?;
        let source = self.load_source(def)?;
        let target = self.load_target(def)?;

        let mut gaps: BTreeMap<GapKey, DataGap> = BTreeMap::new();

        let null_ids = self
            .source
            .count_null_ids(table)
            .map_err(|e| store_error(table, StoreSide::Source, e))?;
        if null_ids > 0 {
            // Rows without an id cannot be migrated; they are reported under an empty record id.
            push(
                &mut gaps,
                DataGap::new(
                    table,
                    GapType::DataCorruption,
                    "",
                    format!("source: {null_ids} row(s) with a null id"),
                ),
            );
        }

        for (id, record) in &source {
            if !target.contains_key(id) {
                push(
                    &mut gaps,
                    DataGap::new(table, GapType::MissingRecord, id, "record not present in target")
                        .with_source(Some(record)),
                );
            }
        }
        for (id, record) in &target {
            if !source.contains_key(id) {
                push(
                    &mut gaps,
                    DataGap::new(table, GapType::OrphanedRecord, id, "record not present in source")
                        .with_target(Some(record)),
                );
            }
        }

        self.check_corruption(def, &source, &target, &mut gaps);
        self.check_integrity(def, StoreSide::Source, &source, &target, &mut gaps)?;
        self.check_integrity(def, StoreSide::Target, &target, &source, &mut gaps)?;

        for (id, src) in &source {
            if let Some(tgt) = target.get(id) {
                compare_pair(def, src, tgt, &mut gaps);
            }
        }

        debug!(
            table,
            source = source.len(),
            target = target.len(),
            gaps = gaps.len(),
            "table compared"
        );
        Ok(gaps.into_values().collect())
    }

    fn load_source(&self, def: &TableDef) -> Result<BTreeMap<String, Record>> {
        let ids = self
            .source
            .list_ids(&def.name)
            .map_err(|e| store_error(&def.name, StoreSide::Source, e))?;
        let mut records = BTreeMap::new();
        for chunk in ids.chunks(LOAD_CHUNK) {
            let fetched = self
                .source
                .get_many(&def.name, chunk)
                .map_err(|e| store_error(&def.name, StoreSide::Source, e))?;
            records.extend(fetched.into_iter().map(|r| (r.id.clone(), r)));
        }
        Ok(records)
    }

    fn load_target(&self, def: &TableDef) -> Result<BTreeMap<String, Record>> {
        let ids = self
            .target
            .list_ids(&def.name)
            .map_err(|e| store_error(&def.name, StoreSide::Target, e))?;
        let mut records = BTreeMap::new();
        for id in ids {
            let record = self
                .target
                .get(&def.name, &id)
                .map_err(|e| store_error(&def.name, StoreSide::Target, e))?;
            if let Some(record) = record {
                records.insert(id, record);
            }
        }
        Ok(records)
    }

    fn list_ids(&self, side: StoreSide, table: &str) -> Result<BTreeSet<String>> {
        let ids = match side {
            StoreSide::Source => self.source.list_ids(table),
            StoreSide::Target => self.target.list_ids(table),
        };
        ids.map(|ids| ids.into_iter().collect())
            .map_err(|e| store_error(table, side, e))
    }

    fn check_corruption(
        &self,
        def: &TableDef,
        source: &BTreeMap<String, Record>,
        target: &BTreeMap<String, Record>,
        gaps: &mut BTreeMap<GapKey, DataGap>,
    ) {
        for (side, records) in [(StoreSide::Source, source), (StoreSide::Target, target)] {
            for (id, record) in records {
                let issues = corruption_issues(self.catalog, def, record);
                if issues.is_empty() {
                    continue;
                }
                let gap = DataGap::new(
                    &def.name,
                    GapType::DataCorruption,
                    id,
                    format!("{side}: {}", issues.join(", ")),
                )
                .with_source(source.get(id))
                .with_target(target.get(id));
                push(gaps, gap);
            }
        }
    }

    /// Foreign keys on `records` (from `side`) checked against ids on that same side.
    fn check_integrity(
        &self,
        def: &TableDef,
        side: StoreSide,
        records: &BTreeMap<String, Record>,
        other: &BTreeMap<String, Record>,
        gaps: &mut BTreeMap<GapKey, DataGap>,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut resolved: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for fk in self.catalog.foreign_keys_for(&def.name) {
            if !resolved.contains_key(fk.references.as_str()) {
                let ids = if fk.references == def.name {
                    records.keys().cloned().collect()
                } else {
                    self.list_ids(side, &fk.references)?
                };
                resolved.insert(fk.references.as_str(), ids);
            }
        }

        for (id, record) in records {
            let mut dangling = Vec::new();
            let mut severity = Severity::High;
            for fk in self.catalog.foreign_keys_for(&def.name) {
                // Null and malformed references are corruption, not integrity gaps.
                let Some(ref_id) = record.get(&fk.field).and_then(reference_id) else {
                    continue;
                };
                if !crate::record::is_valid_identifier(&ref_id) {
                    continue;
                }
                let exists = resolved
                    .get(fk.references.as_str())
                    .is_some_and(|ids| ids.contains(&ref_id));
                if !exists {
                    dangling.push(format!("{} -> {}/{}", fk.field, fk.references, ref_id));
                    if def.get_field(&fk.field).is_some_and(|f| f.required) {
                        severity = Severity::Critical;
                    }
                }
            }
            if dangling.is_empty() {
                continue;
            }

            let (src, tgt) = match side {
                StoreSide::Source => (Some(record), other.get(id)),
                StoreSide::Target => (other.get(id), Some(record)),
            };
            let gap = DataGap::new(
                &def.name,
                GapType::IntegrityViolation,
                id,
                format!("{side}: unresolved {}", dangling.join(", ")),
            )
            .with_source(src)
            .with_target(tgt)
            .escalate(severity);
            push(gaps, gap);
        }
        Ok(())
    }
}

/// Field-level comparison of a record present on both sides.
fn compare_pair(def: &TableDef, src: &Record, tgt: &Record, gaps: &mut BTreeMap<GapKey, DataGap>) {
    let src_fields = src.populated_fields();
    let tgt_fields = tgt.populated_fields();

    // Keys the target added on its own; a declared column that is null on the
    // source is an incomplete migration at most.
    let target_only: Vec<&str> = tgt
        .data
        .keys()
        .map(String::as_str)
        .filter(|key| !src.data.contains_key(*key) && !def.declares(key))
        .collect();
    if !target_only.is_empty() {
        push(
            gaps,
            DataGap::new(
                &def.name,
                GapType::SchemaMismatch,
                &src.id,
                format!("fields only in target: {}", target_only.join(", ")),
            )
            .with_source(Some(src))
            .with_target(Some(tgt)),
        );
    }

    let not_migrated: Vec<&str> = src_fields.difference(&tgt_fields).copied().collect();
    if !not_migrated.is_empty() {
        push(
            gaps,
            DataGap::new(
                &def.name,
                GapType::IncompleteMigration,
                &src.id,
                format!("fields missing in target: {}", not_migrated.join(", ")),
            )
            .with_source(Some(src))
            .with_target(Some(tgt)),
        );
    }

    let Some(ts_field) = def.timestamp_field.as_deref() else {
        return;
    };
    let (Some(src_ts), Some(tgt_ts)) = (src.timestamp(ts_field), tgt.timestamp(ts_field)) else {
        return;
    };
    if src_ts == tgt_ts {
        return;
    }

    let differing: Vec<&str> = src_fields
        .intersection(&tgt_fields)
        .copied()
        .filter(|field| *field != ts_field)
        .filter(|field| match (src.get(field), tgt.get(field)) {
            (Some(a), Some(b)) => !same_value(def, field, a, b),
            _ => false,
        })
        .collect();
    if !differing.is_empty() {
        push(
            gaps,
            DataGap::new(
                &def.name,
                GapType::VersionConflict,
                &src.id,
                format!(
                    "modified on both sides (source {src_ts}, target {tgt_ts}): {}",
                    differing.join(", ")
                ),
            )
            .with_source(Some(src))
            .with_target(Some(tgt)),
        );
    }
}

/// Insert a gap, folding it into an existing one with the same key.
fn push(gaps: &mut BTreeMap<GapKey, DataGap>, gap: DataGap) {
    let key = (gap.gap_type, gap.record_id.clone());
    match gaps.get_mut(&key) {
        Some(existing) => {
            existing.description = format!("{}; {}", existing.description, gap.description);
            existing.severity = existing.severity.max(gap.severity);
            if existing.source_data.is_none() {
                existing.source_data = gap.source_data;
            }
            if existing.target_data.is_none() {
                existing.target_data = gap.target_data;
            }
        }
        None => {
            gaps.insert(key, gap);
        }
    }
}

fn store_error(table: &str, side: StoreSide, err: StoreError) -> Error {
    if err.is_connectivity() {
        Error::from_store(side, err)
    } else {
        Error::GapDetection {
            table: table.to_string(),
            message: format!("{side}: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MemoryTarget;
    use serde_json::json;

    /// Source double backed by an in-memory target.
    struct MemorySource(MemoryTarget);

    impl SourceStore for MemorySource {
        fn list_ids(&self, table: &str) -> std::result::Result<Vec<String>, StoreError> {
            self.0.list_ids(table)
        }

        fn get(&self, table: &str, id: &str) -> std::result::Result<Option<Record>, StoreError> {
            self.0.get(table, id)
        }
    }

    fn process(id: &str, ts: &str) -> Record {
        Record::with_id(id)
            .with_field("name", format!("Process {id}"))
            .with_field("updated_at", ts)
    }

    #[test]
    fn test_missing_and_orphaned() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        source.0.save("processes", &process("p1", "2024-01-01 00:00:00")).unwrap();
        source.0.save("processes", &process("p2", "2024-01-01 00:00:00")).unwrap();
        target.save("processes", &process("p2", "2024-01-01 00:00:00")).unwrap();
        target.save("processes", &process("p9", "2024-01-01 00:00:00")).unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        let gaps = detector.detect_table("processes").unwrap();

        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].gap_type, GapType::MissingRecord);
        assert_eq!(gaps[0].record_id, "p1");
        assert!(gaps[0].source_data.is_some() && gaps[0].target_data.is_none());
        assert_eq!(gaps[1].gap_type, GapType::OrphanedRecord);
        assert_eq!(gaps[1].record_id, "p9");
        assert_eq!(gaps[1].severity, Severity::Medium);
    }

    #[test]
    fn test_null_equals_absent() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        source
            .0
            .save("processes", &process("p1", "2024-01-01 00:00:00").with_field("description", json!(null)))
            .unwrap();
        target.save("processes", &process("p1", "2024-01-01 00:00:00")).unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        assert!(detector.detect_table("processes").unwrap().is_empty());
    }

    #[test]
    fn test_schema_mismatch_and_incomplete() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        source
            .0
            .save("processes", &process("p1", "2024-01-01 00:00:00").with_field("status", "draft"))
            .unwrap();
        target
            .save("processes", &process("p1", "2024-01-01 00:00:00").with_field("owner", "ops"))
            .unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        let gaps = detector.detect_table("processes").unwrap();
        let types: Vec<_> = gaps.iter().map(|g| g.gap_type).collect();
        assert_eq!(types, vec![GapType::SchemaMismatch, GapType::IncompleteMigration]);
        assert!(gaps[0].description.contains("owner"));
        assert!(gaps[1].description.contains("status"));
    }

    #[test]
    fn test_declared_field_filled_on_target_is_not_schema_mismatch() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        source
            .0
            .save("processes", &process("p1", "2024-01-01 00:00:00").with_field("description", json!(null)))
            .unwrap();
        target
            .save("processes", &process("p1", "2024-01-01 00:00:00").with_field("description", "filled later"))
            .unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        assert!(detector.detect_table("processes").unwrap().is_empty());
    }

    #[test]
    fn test_detect_tables_resolves_parents_outside_selection() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        let element = Record::with_id("e1")
            .with_field("process_id", "p1")
            .with_field("element_type", "task");
        source.0.save("processes", &process("p1", "2024-01-01 00:00:00")).unwrap();
        source.0.save("elements", &element).unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        let report = detector.detect_tables(&["elements"]).unwrap();
        assert_eq!(report.tables, vec!["elements"]);
        assert_eq!(report.total_gaps, 1);
        assert_eq!(report.gaps[0].gap_type, GapType::MissingRecord);
        assert_eq!(report.gaps[0].record_id, "e1");

        assert!(matches!(
            detector.detect_tables(&["diagrams"]),
            Err(Error::UnknownTable(_))
        ));
    }

    #[test]
    fn test_integrity_escalates_on_required_fk() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        source
            .0
            .save(
                "elements",
                &Record::with_id("e1")
                    .with_field("process_id", "p404")
                    .with_field("element_type", "task"),
            )
            .unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        let gaps = detector.detect_table("elements").unwrap();
        let integrity = gaps
            .iter()
            .find(|g| g.gap_type == GapType::IntegrityViolation)
            .unwrap();
        assert_eq!(integrity.severity, Severity::Critical);
        assert!(!integrity.auto_fixable);
        assert!(integrity.description.starts_with("source:"));
    }

    #[test]
    fn test_corruption_on_both_sides_is_one_gap() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        let broken = Record::with_id("p1").with_field("updated_at", "soon");
        source.0.save("processes", &broken).unwrap();
        target.save("processes", &broken).unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        let gaps = detector.detect_table("processes").unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].gap_type, GapType::DataCorruption);
        assert!(gaps[0].description.contains("source:"));
        assert!(gaps[0].description.contains("target:"));
        assert!(gaps[0].is_critical());
    }

    #[test]
    fn test_version_conflict_needs_payload_difference() {
        let catalog = Catalog::process_catalog();
        let source = MemorySource(MemoryTarget::new());
        let target = MemoryTarget::new();
        source.0.save("processes", &process("p1", "2024-01-01 00:00:00")).unwrap();
        target.save("processes", &process("p1", "2024-02-01 00:00:00")).unwrap();
        source
            .0
            .save("processes", &process("p2", "2024-01-01 00:00:00").with_field("status", "a"))
            .unwrap();
        target
            .save("processes", &process("p2", "2024-02-01 00:00:00").with_field("status", "b"))
            .unwrap();

        let detector = GapDetector::new(&source, &target, &catalog);
        let gaps = detector.detect_table("processes").unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].gap_type, GapType::VersionConflict);
        assert_eq!(gaps[0].record_id, "p2");
        assert!(gaps[0].description.contains("status"));
    }
}
