// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity schemas and the replicated-table identity transform.
//!
//! A schema describes an entity's fields and optional key scheme. Stores use
//! schemas to validate inserts and assign auto-increment keys; the replicator
//! uses [`replicated_schema`] to derive a destination-compatible schema from
//! a discovered source schema.
//!
//! # Identity Transform
//!
//! Source and destination stores must not race on the same auto-increment
//! identity space, so a replicated table never keeps the source's key:
//!
//! - with an identity field requested, the source primary key is dropped and
//!   a fresh auto-increment [`REPL_ID_FIELD`] column takes its place;
//! - otherwise the destination schema carries no key scheme at all.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Name of the synthetic identity column added to replicated tables.
pub const REPL_ID_FIELD: &str = "ReplID";

/// Storage type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
}

/// One field in an entity schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Whether the field may be absent or null on insert.
    #[serde(default = "default_true")]
    pub allow_null: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDef {
    /// Create a nullable field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            allow_null: true,
        }
    }

    /// Mark the field as required on insert.
    pub fn required(mut self) -> Self {
        self.allow_null = false;
        self
    }
}

/// Primary key scheme for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyScheme {
    /// Name of the key field.
    pub field_name: String,
    /// Whether the store assigns the key on insert.
    pub auto_increment: bool,
}

impl KeyScheme {
    /// An auto-increment identity key.
    pub fn identity(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            auto_increment: true,
        }
    }

    /// A caller-supplied (non-generated) key.
    pub fn assigned(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            auto_increment: false,
        }
    }
}

/// Description of an entity's persistent shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub key_scheme: Option<KeyScheme>,
}

impl EntitySchema {
    /// Create an empty schema with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            key_scheme: None,
        }
    }

    /// Append a field definition.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the key scheme.
    pub fn with_key(mut self, key: KeyScheme) -> Self {
        self.key_scheme = Some(key);
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether `other` can serve where this schema is expected.
    ///
    /// Compatible means: every field of this schema exists in `other` with
    /// the same type. `other` may carry extra fields. Key schemes are not
    /// compared; the replicated-table transform changes them deliberately.
    pub fn is_compatible_with(&self, other: &EntitySchema) -> bool {
        self.fields.iter().all(|f| {
            other
                .field(&f.name)
                .map(|of| of.field_type == f.field_type)
                .unwrap_or(false)
        })
    }
}

/// Derive the destination schema for a replicated table.
///
/// Renames the schema to `remote_name` and applies the identity transform
/// described in the module docs. With `create_identity_field` set, the source
/// must declare a primary key; [`StoreError::MissingPrimaryKey`] is raised
/// otherwise.
pub fn replicated_schema(
    source: &EntitySchema,
    remote_name: &str,
    create_identity_field: bool,
) -> Result<EntitySchema> {
    let mut schema = source.clone();
    schema.name = remote_name.to_string();

    if create_identity_field {
        let key = schema
            .key_scheme
            .take()
            .ok_or_else(|| StoreError::MissingPrimaryKey(source.name.clone()))?;
        schema.fields.retain(|f| f.name != key.field_name);
        schema
            .fields
            .push(FieldDef::new(REPL_ID_FIELD, FieldType::Integer));
        schema.key_scheme = Some(KeyScheme::identity(REPL_ID_FIELD));
    } else {
        schema.key_scheme = None;
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading_schema() -> EntitySchema {
        EntitySchema::new("Reading")
            .with_field(FieldDef::new("seq", FieldType::Integer))
            .with_field(FieldDef::new("value", FieldType::Float))
            .with_key(KeyScheme::identity("seq"))
    }

    #[test]
    fn test_field_lookup() {
        let schema = reading_schema();
        assert!(schema.field("seq").is_some());
        assert!(schema.field("missing").is_none());
    }

    #[test]
    fn test_compatibility_superset_ok() {
        let schema = reading_schema();
        let wider = reading_schema().with_field(FieldDef::new("unit", FieldType::Text));
        assert!(schema.is_compatible_with(&wider));
        // Narrower schema is not compatible the other way
        assert!(!wider.is_compatible_with(&schema));
    }

    #[test]
    fn test_compatibility_type_mismatch() {
        let schema = reading_schema();
        let other = EntitySchema::new("Reading")
            .with_field(FieldDef::new("seq", FieldType::Text))
            .with_field(FieldDef::new("value", FieldType::Float));
        assert!(!schema.is_compatible_with(&other));
    }

    #[test]
    fn test_replicated_schema_with_identity() {
        let schema = replicated_schema(&reading_schema(), "ReadingArchive", true).unwrap();

        assert_eq!(schema.name, "ReadingArchive");
        // Source key dropped, ReplID added
        assert!(schema.field("seq").is_none());
        assert!(schema.field(REPL_ID_FIELD).is_some());
        let key = schema.key_scheme.unwrap();
        assert_eq!(key.field_name, REPL_ID_FIELD);
        assert!(key.auto_increment);
    }

    #[test]
    fn test_replicated_schema_without_identity_drops_key() {
        let schema = replicated_schema(&reading_schema(), "ReadingArchive", false).unwrap();

        assert_eq!(schema.name, "ReadingArchive");
        assert!(schema.key_scheme.is_none());
        // Fields untouched
        assert!(schema.field("seq").is_some());
        assert!(schema.field("value").is_some());
    }

    #[test]
    fn test_replicated_schema_identity_requires_key() {
        let keyless = EntitySchema::new("Log").with_field(FieldDef::new("line", FieldType::Text));
        let err = replicated_schema(&keyless, "LogArchive", true).unwrap_err();
        assert!(matches!(err, StoreError::MissingPrimaryKey(_)));
    }
}
