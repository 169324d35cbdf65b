//! Table and field descriptors.

use serde::{Deserialize, Serialize};

/// Value kind of a field, as far as detection and validation care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text.
    Text,
    /// Integer number.
    Integer,
    /// Floating point number.
    Real,
    /// Boolean (SQLite stores these as integers).
    Boolean,
    /// Structured JSON, stored either as a JSON value or as JSON text.
    Json,
    /// Timestamp (RFC 3339, SQLite datetime text, or epoch number).
    Timestamp,
}

/// A field within a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field (column) name.
    pub name: String,
    /// Value kind.
    pub kind: FieldKind,
    /// Whether a non-null value is required.
    pub required: bool,
}

impl FieldDef {
    /// Create a required field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// Create an optional field.
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Schema descriptor for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Name of the identity field.
    pub id_field: String,
    /// Declared fields, including the identity field.
    pub fields: Vec<FieldDef>,
    /// Field carrying the last-modified timestamp, if the table has one.
    pub timestamp_field: Option<String>,
}

impl TableDef {
    /// Create a table whose identity field is a required text field.
    pub fn new(name: impl Into<String>, id_field: impl Into<String>) -> Self {
        let id_field = id_field.into();
        Self {
            name: name.into(),
            fields: vec![FieldDef::new(id_field.clone(), FieldKind::Text)],
            id_field,
            timestamp_field: None,
        }
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Declare an optional timestamp field and use it as the last-modified marker.
    pub fn with_timestamp(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if self.get_field(&field).is_none() {
            self.fields
                .push(FieldDef::optional(field.clone(), FieldKind::Timestamp));
        }
        self.timestamp_field = Some(field);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Required fields.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Fields of the given kind.
    pub fn fields_of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }

    /// Whether a field is declared.
    pub fn declares(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder() {
        let table = TableDef::new("processes", "id")
            .with_field(FieldDef::new("name", FieldKind::Text))
            .with_field(FieldDef::optional("definition", FieldKind::Json))
            .with_timestamp("updated_at");

        assert_eq!(table.fields.len(), 4);
        assert!(table.get_field("id").unwrap().required);
        assert!(!table.get_field("updated_at").unwrap().required);
        assert_eq!(table.timestamp_field.as_deref(), Some("updated_at"));
        assert_eq!(table.required_fields().count(), 2);
        assert_eq!(table.fields_of_kind(FieldKind::Json).count(), 1);
    }

    #[test]
    fn test_with_timestamp_keeps_existing_declaration() {
        let table = TableDef::new("elements", "id")
            .with_field(FieldDef::new("modified", FieldKind::Timestamp))
            .with_timestamp("modified");

        assert_eq!(table.fields.len(), 2);
        assert!(table.get_field("modified").unwrap().required);
    }
}
