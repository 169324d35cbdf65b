//! Aggregated gap report.

use super::gap::{DataGap, GapType, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of a detection pass over several tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    /// RFC 3339 time the report was produced.
    pub generated_at: String,
    /// Tables examined, in dependency order.
    pub tables: Vec<String>,
    /// Number of gaps.
    pub total_gaps: usize,
    /// Gap count per type.
    pub by_type: BTreeMap<GapType, usize>,
    /// Gap count per severity.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Tables whose detection failed, with the reason.
    #[serde(default)]
    pub table_errors: BTreeMap<String, String>,
    /// Every gap, ordered by table, gap type, record id.
    pub gaps: Vec<DataGap>,
}

impl GapReport {
    /// Build a report, computing the counters.
    pub fn new(
        tables: Vec<&str>,
        gaps: Vec<DataGap>,
        table_errors: BTreeMap<String, String>,
    ) -> Self {
        let mut by_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for gap in &gaps {
            *by_type.entry(gap.gap_type).or_insert(0) += 1;
            *by_severity.entry(gap.severity).or_insert(0) += 1;
        }
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tables: tables.into_iter().map(str::to_string).collect(),
            total_gaps: gaps.len(),
            by_type,
            by_severity,
            table_errors,
            gaps,
        }
    }

    /// Number of gaps of one type.
    pub fn count(&self, gap_type: GapType) -> usize {
        self.by_type.get(&gap_type).copied().unwrap_or(0)
    }

    /// Number of critical gaps.
    pub fn critical_count(&self) -> usize {
        self.by_severity.get(&Severity::Critical).copied().unwrap_or(0)
    }

    /// Gaps the fix engine can repair.
    pub fn auto_fixable(&self) -> impl Iterator<Item = &DataGap> {
        self.gaps.iter().filter(|g| g.auto_fixable)
    }

    /// Gaps of one table.
    pub fn for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a DataGap> {
        self.gaps.iter().filter(move |g| g.table == table)
    }

    /// Whether nothing diverges and every table was examined.
    pub fn is_clean(&self) -> bool {
        self.gaps.is_empty() && self.table_errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let gaps = vec![
            DataGap::new("processes", GapType::MissingRecord, "p1", "missing"),
            DataGap::new("processes", GapType::MissingRecord, "p2", "missing"),
            DataGap::new("elements", GapType::DataCorruption, "e1", "bad"),
        ];
        let report = GapReport::new(vec!["processes", "elements"], gaps, BTreeMap::new());

        assert_eq!(report.total_gaps, 3);
        assert_eq!(report.count(GapType::MissingRecord), 2);
        assert_eq!(report.count(GapType::VersionConflict), 0);
        assert_eq!(report.critical_count(), 1);
        assert_eq!(report.auto_fixable().count(), 2);
        assert_eq!(report.for_table("elements").count(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_json_keys_are_wire_names() {
        let gaps = vec![DataGap::new("processes", GapType::OrphanedRecord, "p9", "orphan")];
        let report = GapReport::new(vec!["processes"], gaps, BTreeMap::new());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["by_type"]["ORPHANED_RECORD"], 1);
        assert_eq!(value["by_severity"]["medium"], 1);

        let back: GapReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }
}
