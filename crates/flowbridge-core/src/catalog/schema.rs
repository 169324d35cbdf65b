//! Catalog of tables and foreign keys.

use super::table::{FieldDef, FieldKind, TableDef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A foreign-key reference from `table.field` to the id of `references`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing table.
    pub table: String,
    /// Referencing field.
    pub field: String,
    /// Referenced table.
    pub references: String,
}

impl ForeignKey {
    /// Create a foreign key.
    pub fn new(
        table: impl Into<String>,
        field: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            references: references.into(),
        }
    }
}

/// Ordered set of table descriptors plus the FK mapping.
///
/// Table order is dependency order: a table appears after every table it
/// references. Migration and fixes walk tables in this order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Tables in dependency order.
    pub tables: Vec<TableDef>,
    /// Foreign keys between tables.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table.
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Look up a table.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Look up a table, failing if it is unknown.
    pub fn require_table(&self, name: &str) -> Result<&TableDef> {
        self.table(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Position of a table in dependency order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == name)
    }

    /// Table names in dependency order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Foreign keys declared on a table.
    pub fn foreign_keys_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.foreign_keys.iter().filter(move |fk| fk.table == table)
    }

    /// Check that the catalog is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(Error::Config("catalog has no tables".to_string()));
        }
        for (idx, table) in self.tables.iter().enumerate() {
            if self.position(&table.name) != Some(idx) {
                return Err(Error::Config(format!("table '{}' declared twice", table.name)));
            }
            if !crate::record::is_valid_identifier(&table.name) || table.name.contains(['.', ':', '-']) {
                return Err(Error::Config(format!("invalid table name '{}'", table.name)));
            }
            if !table.declares(&table.id_field) {
                return Err(Error::Config(format!(
                    "table '{}' does not declare its id field '{}'",
                    table.name, table.id_field
                )));
            }
        }
        for fk in &self.foreign_keys {
            let table_pos = self
                .position(&fk.table)
                .ok_or_else(|| Error::UnknownTable(fk.table.clone()))?;
            let ref_pos = self
                .position(&fk.references)
                .ok_or_else(|| Error::UnknownTable(fk.references.clone()))?;
            if ref_pos > table_pos {
                return Err(Error::Config(format!(
                    "'{}' references '{}', which is ordered after it",
                    fk.table, fk.references
                )));
            }
            if !self.tables[table_pos].declares(&fk.field) {
                return Err(Error::Config(format!(
                    "foreign key field '{}.{}' is not declared",
                    fk.table, fk.field
                )));
            }
        }
        Ok(())
    }

    /// Restrict the catalog to the named tables, keeping dependency order.
    ///
    /// Foreign keys survive only when both ends are kept, so the subset
    /// validates on its own.
    pub fn subset(&self, names: &[String]) -> Result<Catalog> {
        for name in names {
            self.require_table(name)?;
        }
        let kept = |table: &String| names.contains(table);
        Ok(Catalog {
            tables: self
                .tables
                .iter()
                .filter(|t| kept(&t.name))
                .cloned()
                .collect(),
            foreign_keys: self
                .foreign_keys
                .iter()
                .filter(|fk| kept(&fk.table) && kept(&fk.references))
                .cloned()
                .collect(),
        })
    }

    /// The process-diagram catalog: processes, elements, connections, metadata.
    pub fn process_catalog() -> Self {
        let processes = TableDef::new("processes", "id")
            .with_fields([
                FieldDef::new("name", FieldKind::Text),
                FieldDef::optional("description", FieldKind::Text),
                FieldDef::optional("status", FieldKind::Text),
                FieldDef::optional("version", FieldKind::Integer),
                FieldDef::optional("definition", FieldKind::Json),
                FieldDef::optional("tags", FieldKind::Json),
                FieldDef::optional("created_at", FieldKind::Timestamp),
            ])
            .with_timestamp("updated_at");

        let elements = TableDef::new("elements", "id")
            .with_fields([
                FieldDef::new("process_id", FieldKind::Text),
                FieldDef::new("element_type", FieldKind::Text),
                FieldDef::optional("name", FieldKind::Text),
                FieldDef::optional("properties", FieldKind::Json),
                FieldDef::optional("position", FieldKind::Json),
            ])
            .with_timestamp("updated_at");

        let connections = TableDef::new("connections", "id")
            .with_fields([
                FieldDef::new("process_id", FieldKind::Text),
                FieldDef::new("source_element_id", FieldKind::Text),
                FieldDef::new("target_element_id", FieldKind::Text),
                FieldDef::optional("connection_type", FieldKind::Text),
                FieldDef::optional("label", FieldKind::Text),
                FieldDef::optional("properties", FieldKind::Json),
            ])
            .with_timestamp("updated_at");

        let metadata = TableDef::new("metadata", "id")
            .with_fields([
                FieldDef::new("process_id", FieldKind::Text),
                FieldDef::new("key", FieldKind::Text),
                FieldDef::optional("value", FieldKind::Json),
            ])
            .with_timestamp("updated_at");

        Catalog::new()
            .with_table(processes)
            .with_table(elements)
            .with_table(connections)
            .with_table(metadata)
            .with_foreign_key(ForeignKey::new("elements", "process_id", "processes"))
            .with_foreign_key(ForeignKey::new("connections", "process_id", "processes"))
            .with_foreign_key(ForeignKey::new("connections", "source_element_id", "elements"))
            .with_foreign_key(ForeignKey::new("connections", "target_element_id", "elements"))
            .with_foreign_key(ForeignKey::new("metadata", "process_id", "processes"))
    }
}
