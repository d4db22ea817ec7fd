//! Entity payloads: the unit of recovery and replication.
//!
//! The framework persists two kinds of records through the same machinery:
//!
//! - **Typed** entities: application structs implementing [`EntityType`],
//!   converted to a field map via serde at the boundary.
//! - **Dynamic** entities: runtime-named records whose shape is only known
//!   as a field map (the schema-less case).
//!
//! [`Entity`] is the sum type over both, so the recovery queue and the
//! replicator can treat them uniformly without reflection.
//!
//! # Example
//!
//! ```rust
//! use datastore_sync::entity::{Entity, EntityType};
//! use datastore_sync::schema::{EntitySchema, FieldDef, FieldType, KeyScheme};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Order {
//!     order_id: i64,
//!     total: f64,
//! }
//!
//! impl EntityType for Order {
//!     fn entity_name() -> &'static str {
//!         "Order"
//!     }
//!
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new("Order")
//!             .with_field(FieldDef::new("order_id", FieldType::Integer))
//!             .with_field(FieldDef::new("total", FieldType::Float))
//!             .with_key(KeyScheme::identity("order_id"))
//!     }
//! }
//!
//! let entity = Entity::from_typed(&Order { order_id: 1, total: 9.5 }).unwrap();
//! assert_eq!(entity.entity_name(), "Order");
//! ```

use crate::error::{Result, StoreError};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::schema::EntitySchema;

/// A statically-declared entity type.
///
/// Implementors provide their persistent name and schema; instances are
/// lowered to an [`Entity`] field map with serde. The serialized form must be
/// a JSON object (a struct with named fields).
pub trait EntityType: Serialize + Send + Sync + 'static {
    /// The name this entity is stored under.
    fn entity_name() -> &'static str;

    /// The schema describing this entity's fields and key.
    fn schema() -> EntitySchema;
}

/// An entity instance flowing through recovery or replication.
///
/// Either a lowered typed instance or a runtime-named dynamic record. Both
/// carry their fields as a `serde_json` map; equality is field-for-field,
/// which is what the retry queue's duplicate suppression and the store's
/// delete-by-value rely on.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Instance of a declared [`EntityType`].
    Typed {
        type_name: &'static str,
        fields: Map<String, Value>,
    },
    /// Runtime-named record with no compile-time type.
    Dynamic {
        name: String,
        fields: Map<String, Value>,
    },
}

impl Entity {
    /// Lower a typed instance to an entity payload.
    ///
    /// Fails with [`StoreError::Serialization`] if the value does not
    /// serialize to an object.
    pub fn from_typed<T: EntityType>(value: &T) -> Result<Self> {
        match serde_json::to_value(value) {
            Ok(Value::Object(fields)) => Ok(Self::Typed {
                type_name: T::entity_name(),
                fields,
            }),
            Ok(other) => Err(StoreError::Serialization(format!(
                "entity '{}' serialized to {:?}, expected an object",
                T::entity_name(),
                other
            ))),
            Err(e) => Err(StoreError::Serialization(e.to_string())),
        }
    }

    /// Create a dynamic entity from a name and field map.
    pub fn dynamic(name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self::Dynamic {
            name: name.into(),
            fields,
        }
    }

    /// The name this entity is stored under.
    pub fn entity_name(&self) -> &str {
        match self {
            Self::Typed { type_name, .. } => type_name,
            Self::Dynamic { name, .. } => name,
        }
    }

    /// The entity's fields.
    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            Self::Typed { fields, .. } | Self::Dynamic { fields, .. } => fields,
        }
    }

    /// Mutable access to the entity's fields.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Self::Typed { fields, .. } | Self::Dynamic { fields, .. } => fields,
        }
    }

    /// Get a single field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields().get(field)
    }

    /// Copy this entity under a different name for the destination store.
    ///
    /// The result is always dynamic: once renamed, the payload no longer
    /// corresponds to a declared type. Renaming to the current name returns
    /// an unchanged clone.
    pub fn renamed(&self, remote_name: &str) -> Entity {
        if self.entity_name() == remote_name {
            return self.clone();
        }
        Entity::Dynamic {
            name: remote_name.to_string(),
            fields: self.fields().clone(),
        }
    }

    /// Return a copy with one field removed.
    ///
    /// Used when the destination schema dropped the source's primary key in
    /// favor of a fresh identity column.
    pub fn without_field(&self, field: &str) -> Entity {
        let mut copy = self.clone();
        copy.fields_mut().remove(field);
        copy
    }
}
