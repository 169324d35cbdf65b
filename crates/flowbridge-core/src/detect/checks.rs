//! Per-record structural checks shared by detection and validation.

use crate::catalog::{Catalog, FieldKind, TableDef};
use crate::record::{is_valid_identifier, parse_timestamp, Record};
use serde_json::Value;
use std::borrow::Cow;

/// Read a reference value as an id. Accepts strings and integers.
pub(crate) fn reference_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Whether a JSON-kind field holds text that does not parse.
pub(crate) fn is_unparseable_json(value: &Value) -> bool {
    match value {
        Value::String(text) => serde_json::from_str::<Value>(text).is_err(),
        _ => false,
    }
}

/// Structural corruption found on one record, as short descriptions.
pub(crate) fn corruption_issues(catalog: &Catalog, table: &TableDef, record: &Record) -> Vec<String> {
    let mut issues = Vec::new();

    if !is_valid_identifier(&record.id) {
        issues.push(format!("malformed id '{}'", record.id));
    }

    for field in table.required_fields() {
        if !record.is_populated(&field.name) {
            issues.push(format!("required field '{}' is null", field.name));
        }
    }

    for field in table.fields_of_kind(FieldKind::Json) {
        if record.get(&field.name).is_some_and(is_unparseable_json) {
            issues.push(format!("field '{}' is not valid JSON", field.name));
        }
    }

    for fk in catalog.foreign_keys_for(&table.name) {
        match record.get(&fk.field) {
            None | Some(Value::Null) => {}
            Some(value) => {
                let well_formed = reference_id(value).is_some_and(|id| is_valid_identifier(&id));
                if !well_formed {
                    issues.push(format!("malformed reference in '{}'", fk.field));
                }
            }
        }
    }

    if let Some(ts_field) = &table.timestamp_field {
        match record.get(ts_field) {
            None | Some(Value::Null) => {}
            Some(value) => {
                if parse_timestamp(value).is_none() {
                    issues.push(format!("unparseable timestamp in '{ts_field}'"));
                }
            }
        }
    }

    issues
}

/// A value in the form used for cross-store comparison.
///
/// JSON columns may arrive as text from the source and as structured values
/// from the target; timestamps may use different encodings of one instant.
pub(crate) fn normalized<'v>(table: &TableDef, field: &str, value: &'v Value) -> Cow<'v, Value> {
    let kind = table.get_field(field).map(|f| f.kind);
    match (kind, value) {
        (Some(FieldKind::Json), Value::String(text)) => serde_json::from_str(text)
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed(value)),
        (Some(FieldKind::Timestamp), _) => parse_timestamp(value)
            .map(|dt| Cow::Owned(Value::String(dt.to_rfc3339())))
            .unwrap_or(Cow::Borrowed(value)),
        (Some(FieldKind::Boolean), Value::Number(n)) => match n.as_i64() {
            Some(0) => Cow::Owned(Value::Bool(false)),
            Some(1) => Cow::Owned(Value::Bool(true)),
            _ => Cow::Borrowed(value),
        },
        _ => Cow::Borrowed(value),
    }
}

/// Whether two values are equal once normalized.
pub(crate) fn same_value(table: &TableDef, field: &str, a: &Value, b: &Value) -> bool {
    a == b || normalized(table, field, a) == normalized(table, field, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn elements() -> (Catalog, TableDef) {
        let catalog = Catalog::process_catalog();
        let table = catalog.table("elements").cloned().unwrap();
        (catalog, table)
    }

    #[test]
    fn test_clean_record_has_no_issues() {
        let (catalog, table) = elements();
        let record = Record::with_id("e1")
            .with_field("process_id", "p1")
            .with_field("element_type", "task")
            .with_field("properties", "{\"x\":1}")
            .with_field("updated_at", "2024-03-01 10:00:00");
        assert!(corruption_issues(&catalog, &table, &record).is_empty());
    }

    #[test]
    fn test_each_corruption_kind_reported() {
        let (catalog, table) = elements();
        let record = Record::with_id("bad id")
            .with_field("process_id", json!(["p1"]))
            .with_field("properties", "{not json")
            .with_field("updated_at", "last tuesday");

        let issues = corruption_issues(&catalog, &table, &record);
        assert_eq!(issues.len(), 5, "{issues:?}");
        assert!(issues.iter().any(|i| i.contains("malformed id")));
        assert!(issues.iter().any(|i| i.contains("'element_type' is null")));
        assert!(issues.iter().any(|i| i.contains("'properties' is not valid JSON")));
        assert!(issues.iter().any(|i| i.contains("malformed reference in 'process_id'")));
        assert!(issues.iter().any(|i| i.contains("unparseable timestamp")));
    }

    #[test]
    fn test_normalized_comparison() {
        let (_, table) = elements();
        assert!(same_value(&table, "properties", &json!("{\"x\": 1}"), &json!({"x": 1})));
        assert!(same_value(
            &table,
            "updated_at",
            &json!("2024-03-01 10:00:00"),
            &json!("2024-03-01T10:00:00Z")
        ));
        assert!(!same_value(&table, "name", &json!("a"), &json!("b")));
    }
}
