//! Shared test utilities for the recovery and replication suites.
//!
//! This module provides:
//! - A flaky [`DataStore`](datastore_sync::DataStore) wrapper with scripted
//!   failure injection
//! - Entity and schema fixtures
//! - A polling helper for background-worker assertions

pub mod flaky_store;

pub use flaky_store::*;

use std::time::Duration;

use datastore_sync::entity::Entity;
use datastore_sync::schema::{EntitySchema, FieldDef, FieldType, KeyScheme};
use serde_json::{json, Map};

/// Schema for the "Reading" fixture entity (identity-keyed).
#[allow(dead_code)] // Replication suite only
pub fn reading_schema() -> EntitySchema {
    EntitySchema::new("Reading")
        .with_field(FieldDef::new("seq", FieldType::Integer))
        .with_field(FieldDef::new("value", FieldType::Float))
        .with_key(KeyScheme::identity("seq"))
}

/// Schema for the "Alert" fixture entity (no key scheme).
pub fn alert_schema() -> EntitySchema {
    EntitySchema::new("Alert").with_field(FieldDef::new("message", FieldType::Text))
}

/// A "Reading" instance with the given value.
#[allow(dead_code)] // Replication suite only
pub fn reading(value: f64) -> Entity {
    let mut fields = Map::new();
    fields.insert("value".to_string(), json!(value));
    Entity::dynamic("Reading", fields)
}

/// An "Alert" instance with the given message.
pub fn alert(message: &str) -> Entity {
    let mut fields = Map::new();
    fields.insert("message".to_string(), json!(message));
    Entity::dynamic("Alert", fields)
}

/// Poll `condition` every 5ms until it holds, panicking after `timeout`.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Async-condition variant of [`wait_for`].
#[allow(dead_code)] // Replication suite only
pub async fn wait_for_async<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
