//! Table descriptors for the source tables.
//!
//! The catalog names every table the engine migrates, the fields detection and
//! validation look at, and the foreign keys between tables.

mod schema;
mod table;

pub use schema::{Catalog, ForeignKey};
pub use table::{FieldDef, FieldKind, TableDef};
