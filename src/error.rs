// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the store synchronization layer.
//!
//! Errors are classified as *recoverable* (transient backend conditions that
//! the Recovery Service may retry) or not. Stores raise `StoreError` from
//! their operations; the recovery and replication workers decide what to do
//! with them.
//!
//! # Error Categories
//!
//! | Error Type | Recoverable | Description |
//! |------------|-------------|-------------|
//! | `Unavailable` | Yes | Backend transiently unreachable (connection drop, timeout) |
//! | `UnknownEntity` | No | Entity name has no registered schema |
//! | `SchemaMismatch` | No | Registered schema is incompatible with an existing one |
//! | `MissingPrimaryKey` | No | Identity transform requested but the source has no key |
//! | `RecoveryQueueFull` | No | Retry queue at capacity with the `Reject` overflow policy |
//! | `Config` | No | Configuration invalid (e.g. replication period below floor) |
//! | `Serialization` | No | Entity could not be converted to a field map |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Recovery Behavior
//!
//! Use [`StoreError::is_recoverable()`] to decide whether a failed insert
//! should be routed into a store's Recovery Service. Recoverable errors
//! indicate transient availability issues; everything else is a programmer
//! error or a permanent condition and must surface to the caller.

use thiserror::Error;

/// Result type alias for store and synchronization operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by stores and the synchronization services built on them.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The backend is transiently unavailable.
    ///
    /// Raised by a store when an insert/select/delete fails for reasons
    /// expected to clear on their own (connection drop, timeout, throttling).
    /// Recoverable: inserts failing this way are eligible for the retry queue.
    #[error("store '{store}' unavailable ({operation}): {message}")]
    Unavailable {
        store: String,
        operation: String,
        message: String,
    },

    /// No schema is registered under the given entity name.
    ///
    /// Not recoverable: register the schema (or the type) first.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// A schema registration conflicts with an existing incompatible schema.
    ///
    /// Not recoverable: raised synchronously at registration time.
    #[error("schema mismatch for '{entity}': {message}")]
    SchemaMismatch { entity: String, message: String },

    /// An identity key scheme was requested for a replicated table but the
    /// source entity declares no primary key to replace.
    ///
    /// Not recoverable: raised synchronously at registration time.
    #[error("entity '{0}' has no primary key to replace with an identity field")]
    MissingPrimaryKey(String),

    /// The retry queue is at capacity and the overflow policy rejects new work.
    #[error("recovery queue full (capacity {capacity})")]
    RecoveryQueueFull { capacity: usize },

    /// Invalid or out-of-range configuration value.
    ///
    /// Not recoverable: fix the configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An entity value could not be converted to a field map.
    ///
    /// Raised when a typed entity serializes to something other than an
    /// object. Not recoverable: indicates a bug in the entity type.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal error.
    ///
    /// Catch-all for conditions that shouldn't happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create an [`Unavailable`](Self::Unavailable) error.
    pub fn unavailable(
        store: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Unavailable {
            store: store.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error represents a transient condition worth retrying.
    ///
    /// This is the default classification; individual stores may override it
    /// via [`DataStore::is_recoverable_error`](crate::store::DataStore::is_recoverable_error).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::UnknownEntity(_) => false,
            Self::SchemaMismatch { .. } => false,
            Self::MissingPrimaryKey(_) => false,
            Self::RecoveryQueueFull { .. } => false,
            Self::Config(_) => false,
            Self::Serialization(_) => false,
            Self::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_recoverable() {
        let err = StoreError::unavailable("primary", "insert", "connection reset");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("primary"));
        assert!(err.to_string().contains("insert"));
    }

    #[test]
    fn test_unknown_entity_not_recoverable() {
        let err = StoreError::UnknownEntity("Orders".to_string());
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("Orders"));
    }

    #[test]
    fn test_schema_mismatch_not_recoverable() {
        let err = StoreError::SchemaMismatch {
            entity: "Orders".to_string(),
            message: "field 'Total' has a different type".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("Total"));
    }

    #[test]
    fn test_missing_primary_key_not_recoverable() {
        let err = StoreError::MissingPrimaryKey("Telemetry".to_string());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_queue_full_not_recoverable() {
        let err = StoreError::RecoveryQueueFull { capacity: 100 };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_config_not_recoverable() {
        let err = StoreError::Config("replication period below 100ms".to_string());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_internal_not_recoverable() {
        let err = StoreError::Internal("unexpected state".to_string());
        assert!(!err.is_recoverable());
    }
}
