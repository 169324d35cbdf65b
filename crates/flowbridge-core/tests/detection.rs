//! Integration tests for gap detection.

mod common;

use common::{process, process_id, FlakyTarget, TestContext, TS_NEW, TS_OLD};
use flowbridge_core::{Error, GapDetector, GapType, Severity, SourceStore, TargetStore};
use serde_json::json;
use std::sync::atomic::Ordering;

fn ids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(process_id).collect()
}

#[test]
fn test_missing_and_orphaned_scenario() {
    let ctx = TestContext::new();
    ctx.seed_processes(10);
    ctx.copy_to_target("processes", &ids(1..=7));
    ctx.target.save("processes", &process("x-orphan-1", "Stale", TS_OLD)).unwrap();
    ctx.target.save("processes", &process("x-orphan-2", "Stale", TS_OLD)).unwrap();

    let source = ctx.source();
    let report = GapDetector::new(&source, &ctx.target, &ctx.catalog)
        .detect_all_gaps()
        .unwrap();

    assert_eq!(report.total_gaps, 5);
    assert_eq!(report.count(GapType::MissingRecord), 3);
    assert_eq!(report.count(GapType::OrphanedRecord), 2);
    assert!(report.table_errors.is_empty());

    let missing: Vec<&str> = report
        .gaps
        .iter()
        .filter(|g| g.gap_type == GapType::MissingRecord)
        .map(|g| g.record_id.as_str())
        .collect();
    assert_eq!(missing, vec!["p0008", "p0009", "p0010"]);
    assert!(report.gaps.iter().all(|g| g.auto_fixable));
}

#[test]
fn test_detection_is_idempotent_and_read_only() {
    let ctx = TestContext::new();
    ctx.seed_processes(5);
    ctx.seed_diagram("p0001");
    ctx.copy_to_target("processes", &ids(1..=3));
    ctx.target.save("elements", &flowbridge_core::Record::with_id("stray")).unwrap();

    let before = ctx.target.snapshot();
    let source = ctx.source();
    let detector = GapDetector::new(&source, &ctx.target, &ctx.catalog);

    let first = detector.detect_all_gaps().unwrap();
    let second = detector.detect_all_gaps().unwrap();

    assert!(first.total_gaps > 0);
    assert_eq!(first.gaps, second.gaps);
    assert_eq!(first.by_type, second.by_type);
    assert_eq!(ctx.target.snapshot(), before);
}

#[test]
fn test_gaps_are_ordered_and_unique() {
    let ctx = TestContext::new();
    ctx.seed_processes(3);
    ctx.seed_diagram("p0001");
    ctx.execute("UPDATE elements SET element_type = NULL WHERE id = 'p0001-e2'");

    let source = ctx.source();
    let report = GapDetector::new(&source, &ctx.target, &ctx.catalog)
        .detect_all_gaps()
        .unwrap();

    let keys: Vec<_> = report.gaps.iter().map(|g| g.key()).collect();
    let mut sorted = keys.clone();
    sorted.sort_by_key(|(table, id, gap_type)| {
        let pos = ctx.catalog.position(table).unwrap();
        (pos, *gap_type, id.to_string())
    });
    assert_eq!(keys, sorted);

    let mut unique = keys.clone();
    unique.dedup();
    assert_eq!(unique.len(), keys.len());
}

#[test]
fn test_corruption_and_integrity_are_critical() {
    let ctx = TestContext::new();
    ctx.seed_processes(1);
    ctx.execute(&format!(
        r#"
        INSERT INTO elements (id, process_id, element_type, updated_at)
            VALUES ('e-dangling', 'p9999', 'task', '{TS_OLD}');
        INSERT INTO elements (id, process_id, element_type, updated_at)
            VALUES ('e-null-type', 'p0001', NULL, '{TS_OLD}');
        INSERT INTO elements (id, process_id, element_type, properties, updated_at)
            VALUES ('e-bad-json', 'p0001', 'task', '{{not json', '{TS_OLD}');
        "#
    ));

    let source = ctx.source();
    let gaps = GapDetector::new(&source, &ctx.target, &ctx.catalog)
        .detect_table("elements")
        .unwrap();

    let find = |id: &str, gap_type: GapType| {
        gaps.iter()
            .find(|g| g.record_id == id && g.gap_type == gap_type)
            .unwrap_or_else(|| panic!("no {gap_type} gap for {id}"))
    };

    let dangling = find("e-dangling", GapType::IntegrityViolation);
    assert_eq!(dangling.severity, Severity::Critical);
    assert!(!dangling.auto_fixable);

    let null_type = find("e-null-type", GapType::DataCorruption);
    assert_eq!(null_type.severity, Severity::Critical);
    assert!(null_type.description.contains("element_type"));

    assert_eq!(find("e-bad-json", GapType::DataCorruption).severity, Severity::Critical);
    assert_eq!(gaps.iter().filter(|g| g.gap_type == GapType::MissingRecord).count(), 3);
}

#[test]
fn test_field_level_gaps() {
    let ctx = TestContext::new();
    ctx.seed_processes(3);
    ctx.execute("UPDATE processes SET description = 'from source' WHERE id = 'p0001'");
    ctx.copy_to_target("processes", &ids(2..=3));

    // p0001: target lacks the description.
    let mut thin = ctx.source().get("processes", "p0001").unwrap().unwrap();
    thin.data.remove("description");
    ctx.target.save("processes", &thin).unwrap();

    // p0002: target gained a field the source never had.
    let extra = ctx
        .target
        .get("processes", "p0002")
        .unwrap()
        .unwrap()
        .with_field("owner", "ops");
    ctx.target.save("processes", &extra).unwrap();

    // p0003: both sides changed.
    let changed = ctx
        .target
        .get("processes", "p0003")
        .unwrap()
        .unwrap()
        .with_field("status", "published")
        .with_field("updated_at", TS_NEW);
    ctx.target.save("processes", &changed).unwrap();

    let source = ctx.source();
    let gaps = GapDetector::new(&source, &ctx.target, &ctx.catalog)
        .detect_table("processes")
        .unwrap();
    let summary: Vec<(&str, GapType)> = gaps.iter().map(|g| (g.record_id.as_str(), g.gap_type)).collect();

    assert_eq!(
        summary,
        vec![
            ("p0002", GapType::SchemaMismatch),
            ("p0001", GapType::IncompleteMigration),
            ("p0003", GapType::VersionConflict),
        ]
    );
}

#[test]
fn test_declared_field_filled_in_target_is_not_a_mismatch() {
    let ctx = TestContext::new();
    ctx.seed_processes(1);
    let filled = ctx
        .source()
        .get("processes", "p0001")
        .unwrap()
        .unwrap()
        .with_field("description", "added after cutover");
    ctx.target.save("processes", &filled).unwrap();

    let source = ctx.source();
    let gaps = GapDetector::new(&source, &ctx.target, &ctx.catalog)
        .detect_table("processes")
        .unwrap();
    assert!(gaps.is_empty(), "unexpected gaps: {gaps:?}");
}

#[test]
fn test_rows_without_id_are_corruption() {
    let ctx = TestContext::new();
    ctx.seed_processes(2);
    ctx.copy_to_target("processes", &ids(1..=2));
    ctx.execute("INSERT INTO processes (id, name) VALUES (NULL, 'Lost')");

    let source = ctx.source();
    let report = GapDetector::new(&source, &ctx.target, &ctx.catalog)
        .detect_all_gaps()
        .unwrap();

    assert_eq!(report.total_gaps, 1);
    let gap = &report.gaps[0];
    assert_eq!(gap.gap_type, GapType::DataCorruption);
    assert_eq!(gap.record_id, "");
    assert!(gap.is_critical());
    assert!(!gap.auto_fixable);
    assert!(gap.description.contains("1 row(s) with a null id"));
}

#[test]
fn test_table_selection_resolves_unselected_parents() {
    let ctx = TestContext::new();
    ctx.seed_processes(1);
    ctx.seed_diagram("p0001");
    ctx.copy_to_target("elements", &["p0001-e1".to_string(), "p0001-e2".to_string()]);

    let source = ctx.source();
    let detector = GapDetector::new(&source, &ctx.target, &ctx.catalog);
    let report = detector.detect_tables(&["elements"]).unwrap();

    // The process itself is missing from the target, but only elements were asked for.
    assert_eq!(report.tables, vec!["elements"]);
    assert_eq!(report.total_gaps, 2);
    assert!(report
        .gaps
        .iter()
        .all(|g| g.gap_type == GapType::IntegrityViolation && g.description.starts_with("target:")));
    assert!(report.gaps.iter().all(|g| g.is_critical()));

    ctx.copy_to_target("processes", &ids(1..=1));
    assert!(detector.detect_tables(&["elements"]).unwrap().is_clean());
}

#[test]
fn test_equivalent_encodings_are_not_conflicts() {
    let ctx = TestContext::new();
    ctx.seed_processes(1);
    ctx.seed_diagram("p0001");
    ctx.copy_to_target("processes", &ids(1..=1));

    let element_ids = vec!["p0001-e1".to_string(), "p0001-e2".to_string()];
    ctx.copy_to_target("elements", &element_ids);

    // Structured JSON and a later timestamp, same content.
    let reencoded = ctx
        .target
        .get("elements", "p0001-e1")
        .unwrap()
        .unwrap()
        .with_field("properties", json!({"color": "green"}))
        .with_field("updated_at", TS_NEW);
    ctx.target.save("elements", &reencoded).unwrap();

    let source = ctx.source();
    let gaps = GapDetector::new(&source, &ctx.target, &ctx.catalog)
        .detect_table("elements")
        .unwrap();
    assert!(gaps.is_empty(), "unexpected gaps: {gaps:?}");
}

#[test]
fn test_unreachable_target_is_an_error_not_a_gap() {
    let ctx = TestContext::new();
    ctx.seed_processes(2);
    let target = FlakyTarget::new();
    target.unreachable.store(true, Ordering::SeqCst);

    let source = ctx.source();
    let result = GapDetector::new(&source, &target, &ctx.catalog).detect_all_gaps();
    assert!(matches!(result, Err(Error::Connectivity { .. })));
}
