//! Gap detection between source and target.
//!
//! Seven gap types are recognised; each carries a severity and whether it can
//! be fixed automatically. Detection has no side effects.

mod checks;
mod detector;
mod gap;
mod report;

pub(crate) use checks::{is_unparseable_json, reference_id};
pub use detector::GapDetector;
pub use gap::{DataGap, GapType, Severity};
pub use report::GapReport;
