// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The abstract store contract consumed by the recovery and replication layer.
//!
//! Per-backend store implementations live outside this crate; everything here
//! talks to them through [`DataStore`]. The trait is object-safe (boxed
//! futures) so a [`Replicator`](crate::Replicator) can hold two differently
//! backed stores as `Arc<dyn DataStore>`.
//!
//! # Insert Notifications
//!
//! Stores expose an after-insert broadcast channel via
//! [`subscribe_inserts`](DataStore::subscribe_inserts). The replicator
//! subscribes to its source's channel so freshly written registered entities
//! wake the scheduler ahead of the replication period. This is explicit
//! dependency injection; there is no ambient event wiring.
//!
//! # Example
//!
//! ```rust
//! use datastore_sync::store::{DataStore, MemoryStore};
//! use datastore_sync::entity::Entity;
//! use serde_json::Map;
//!
//! # async fn example() -> datastore_sync::Result<()> {
//! let store = MemoryStore::new("primary");
//! store.register_schema(
//!     datastore_sync::schema::EntitySchema::new("Event"),
//!     true,
//! ).await?;
//!
//! store.insert(Entity::dynamic("Event", Map::new()), false, false).await?;
//! assert_eq!(store.select("Event").await?.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::schema::EntitySchema;

/// Type alias for boxed async futures (reduces trait signature noise).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Notification emitted by a store after each successful insert.
#[derive(Debug, Clone)]
pub struct InsertNotice {
    /// Name the entity was stored under.
    pub entity_name: String,
    /// The inserted instance.
    pub entity: Entity,
}

/// Abstract contract every backend store implements.
///
/// The synchronization core never performs I/O itself: inserts, selects,
/// deletes, and schema registration all go through this trait. Failure
/// classification also lives here: [`is_recoverable_error`](Self::is_recoverable_error)
/// lets a backend refine which of its errors are worth routing into a
/// Recovery Service.
pub trait DataStore: Send + Sync + 'static {
    /// A short name for this store, used in logs and error messages.
    fn store_name(&self) -> &str;

    /// Insert an entity.
    ///
    /// `insert_references` asks the backend to cascade related records.
    /// `is_recovery_replay` marks replays from a Recovery Service; a failing
    /// replay must not be re-enqueued by the store, the recovery worker owns
    /// the retry accounting.
    fn insert(
        &self,
        entity: Entity,
        insert_references: bool,
        is_recovery_replay: bool,
    ) -> BoxFuture<'_, ()>;

    /// Fetch all entities currently stored under `entity_name`.
    fn select(&self, entity_name: &str) -> BoxFuture<'_, Vec<Entity>>;

    /// Delete an entity by value. Returns whether a matching row was removed.
    fn delete<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, bool>;

    /// Register a declared entity type's schema.
    fn add_type(&self, schema: EntitySchema) -> BoxFuture<'_, ()>;

    /// Describe the shape of a runtime-named entity.
    fn discover_schema(&self, entity_name: &str) -> BoxFuture<'_, EntitySchema>;

    /// Register a schema, optionally tolerating an existing compatible one.
    ///
    /// With `ensure_compatibility`, an existing registration is accepted when
    /// the new schema's fields are all present with matching types; an
    /// incompatible registration raises [`StoreError::SchemaMismatch`].
    /// Without it, any existing registration is an error.
    fn register_schema(
        &self,
        schema: EntitySchema,
        ensure_compatibility: bool,
    ) -> BoxFuture<'_, ()>;

    /// Classify whether a failure from this store is worth retrying.
    ///
    /// Defaults to the error's own classification; backends with richer
    /// failure information (driver error codes, HTTP status) override this.
    fn is_recoverable_error(&self, err: &StoreError) -> bool {
        err.is_recoverable()
    }

    /// Subscribe to after-insert notifications.
    fn subscribe_inserts(&self) -> broadcast::Receiver<InsertNotice>;
}

/// Capacity of a store's insert-notification channel.
///
/// Slow subscribers that lag past this many notices miss wake-ups, not data:
/// a missed notice only delays replication until the next period tick.
const INSERT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct MemoryInner {
    schemas: HashMap<String, EntitySchema>,
    rows: HashMap<String, Vec<Entity>>,
    next_ids: HashMap<String, i64>,
}

/// In-memory reference implementation of [`DataStore`].
///
/// Used by examples, tests, and standalone mode. Supports auto-increment key
/// assignment, schema compatibility checks, insert notifications, and an
/// `offline` switch that simulates a transient backend outage (every
/// operation fails with a recoverable [`StoreError::Unavailable`]).
pub struct MemoryStore {
    name: String,
    inner: RwLock<MemoryInner>,
    offline: AtomicBool,
    insert_tx: broadcast::Sender<InsertNotice>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        let (insert_tx, _) = broadcast::channel(INSERT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            inner: RwLock::new(MemoryInner::default()),
            offline: AtomicBool::new(false),
            insert_tx,
        }
    }

    /// Simulate a transient outage: while offline, all operations fail with
    /// a recoverable error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of rows currently stored under `entity_name`.
    pub async fn row_count(&self, entity_name: &str) -> usize {
        self.inner
            .read()
            .await
            .rows
            .get(entity_name)
            .map_or(0, Vec::len)
    }

    fn check_online(&self, operation: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::unavailable(&self.name, operation, "store offline"))
        } else {
            Ok(())
        }
    }
}

impl DataStore for MemoryStore {
    fn store_name(&self) -> &str {
        &self.name
    }

    fn insert(
        &self,
        mut entity: Entity,
        _insert_references: bool,
        is_recovery_replay: bool,
    ) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.check_online("insert")?;

            let mut inner = self.inner.write().await;
            let name = entity.entity_name().to_string();
            let schema = inner
                .schemas
                .get(&name)
                .ok_or_else(|| StoreError::UnknownEntity(name.clone()))?
                .clone();

            for field in &schema.fields {
                if !field.allow_null && !entity.fields().contains_key(&field.name) {
                    return Err(StoreError::SchemaMismatch {
                        entity: name,
                        message: format!("required field '{}' missing", field.name),
                    });
                }
            }

            if let Some(key) = schema.key_scheme.as_ref().filter(|k| k.auto_increment) {
                let next = inner.next_ids.entry(name.clone()).or_insert(1);
                entity
                    .fields_mut()
                    .insert(key.field_name.clone(), serde_json::json!(*next));
                *next += 1;
            }

            let notice = InsertNotice {
                entity_name: name.clone(),
                entity: entity.clone(),
            };
            inner.rows.entry(name.clone()).or_default().push(entity);
            drop(inner);

            debug!(store = %self.name, entity = %name, replay = is_recovery_replay, "inserted");
            // No subscribers is fine
            let _ = self.insert_tx.send(notice);
            Ok(())
        })
    }

    fn select(&self, entity_name: &str) -> BoxFuture<'_, Vec<Entity>> {
        let name = entity_name.to_string();
        Box::pin(async move {
            self.check_online("select")?;
            let inner = self.inner.read().await;
            if !inner.schemas.contains_key(&name) {
                return Err(StoreError::UnknownEntity(name));
            }
            Ok(inner.rows.get(&name).cloned().unwrap_or_default())
        })
    }

    fn delete<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.check_online("delete")?;
            let mut inner = self.inner.write().await;
            let Some(rows) = inner.rows.get_mut(entity.entity_name()) else {
                return Ok(false);
            };
            match rows.iter().position(|row| row == entity) {
                Some(idx) => {
                    rows.remove(idx);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn add_type(&self, schema: EntitySchema) -> BoxFuture<'_, ()> {
        self.register_schema(schema, true)
    }

    fn discover_schema(&self, entity_name: &str) -> BoxFuture<'_, EntitySchema> {
        let name = entity_name.to_string();
        Box::pin(async move {
            self.check_online("discover_schema")?;
            self.inner
                .read()
                .await
                .schemas
                .get(&name)
                .cloned()
                .ok_or(StoreError::UnknownEntity(name))
        })
    }

    fn register_schema(
        &self,
        schema: EntitySchema,
        ensure_compatibility: bool,
    ) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.check_online("register_schema")?;
            let mut inner = self.inner.write().await;
            if let Some(existing) = inner.schemas.get(&schema.name) {
                if !ensure_compatibility {
                    return Err(StoreError::SchemaMismatch {
                        entity: schema.name.clone(),
                        message: "entity already registered".to_string(),
                    });
                }
                if !schema.is_compatible_with(existing) {
                    return Err(StoreError::SchemaMismatch {
                        entity: schema.name.clone(),
                        message: "existing registration is incompatible".to_string(),
                    });
                }
                return Ok(());
            }
            debug!(store = %self.name, entity = %schema.name, "registered schema");
            inner.schemas.insert(schema.name.clone(), schema);
            Ok(())
        })
    }

    fn subscribe_inserts(&self) -> broadcast::Receiver<InsertNotice> {
        self.insert_tx.subscribe()
    }
}
