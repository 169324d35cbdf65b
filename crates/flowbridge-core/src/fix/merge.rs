//! Field-level merge for version conflicts.

use crate::catalog::TableDef;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How to merge when both sides carry the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeTieBreak {
    /// Keep the target record unchanged.
    #[default]
    PreferTarget,
    /// Keep target values, filling target nulls from the source.
    PreferNonNull,
}

/// Merge two images of one record.
///
/// The side with the later timestamp wins each field it has populated; where
/// it is null the other side's value stays. A missing or unparseable
/// timestamp counts as older than any valid one.
pub fn merge_records(table: &TableDef, source: &Record, target: &Record, tie_break: MergeTieBreak) -> Record {
    let order = match table.timestamp_field.as_deref() {
        Some(field) => match (source.timestamp(field), target.timestamp(field)) {
            (Some(s), Some(t)) => s.cmp(&t),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        },
        None => Ordering::Equal,
    };

    match order {
        Ordering::Greater => overlay(target, source),
        Ordering::Less => overlay(source, target),
        Ordering::Equal => match tie_break {
            MergeTieBreak::PreferTarget => target.clone(),
            MergeTieBreak::PreferNonNull => overlay(source, target),
        },
    }
}

/// `later`'s populated fields laid over `older`.
fn overlay(older: &Record, later: &Record) -> Record {
    let mut merged = older.clone();
    merged.id = later.id.clone();
    for (field, value) in &later.data {
        if !value.is_null() || !merged.data.contains_key(field) {
            merged.data.insert(field.clone(), value.clone());
        }
    }
    merged
}
