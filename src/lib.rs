//! # Datastore Sync
//!
//! The resilience and synchronization layer shared by the framework's data
//! stores: a per-store **Recovery Service** that replays transiently failed
//! inserts, and a **Replicator** that moves entities between two
//! independently-shaped stores on a priority schedule.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              application                                 │
//! │        insert ──► DataStore ──(recoverable failure)──► RetryQueue        │
//! │                       │                                     │            │
//! │                       │ after-insert notice                 ▼            │
//! │                       ▼                             RecoveryService      │
//! │  ┌─────────────────────────────────────────┐        (replay worker)      │
//! │  │               Replicator                │                             │
//! │  │  RegistrationTable ─► scheduler task    │                             │
//! │  │  (High ► Normal ► Low, timer-or-wake)   │                             │
//! │  └─────────────────────────────────────────┘                             │
//! │        source.select ─► destination.insert ─► source.delete              │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery Semantics
//!
//! Replication is a one-directional **move**: the destination insert and the
//! source delete are independent operations, so the guarantee is
//! at-least-once delivery into the destination with possible duplicates,
//! never silent loss. Recovery likewise never loses a write silently: an
//! item leaves the retry queue only by successful replay or by counted
//! abandonment.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use datastore_sync::{
//!     MemoryStore, RecoveryConfig, RecoveryService, Replicator, ReplicatorConfig,
//!     ReplicationPriority,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> datastore_sync::Result<()> {
//! let edge = Arc::new(MemoryStore::new("edge"));
//! let hub = Arc::new(MemoryStore::new("hub"));
//!
//! // Failed inserts on the edge store are replayed in the background
//! let recovery = RecoveryService::new(edge.clone(), RecoveryConfig::default());
//! recovery.set_enabled(true);
//!
//! // Entities named "Reading" drain from edge to hub, highest priority first
//! let replicator = Replicator::new(edge, hub, ReplicatorConfig::default())?;
//! replicator
//!     .register_named("Reading", "ReadingArchive", ReplicationPriority::High)
//!     .await?;
//! replicator.start();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod metrics;
pub mod recovery;
pub mod registry;
pub mod replicator;
pub mod schema;
pub mod store;

// Re-exports for convenience
pub use config::{OverflowPolicy, RecoveryConfig, ReplicatorConfig, MIN_REPLICATION_PERIOD_MS};
pub use entity::{Entity, EntityType};
pub use error::{Result, StoreError};
pub use recovery::{RecoveryService, RecoveryStats};
pub use registry::{NameRegistration, RegistrationTable, ReplicationPriority, TypeRegistration};
pub use replicator::{ReplicationEvent, Replicator};
pub use schema::{EntitySchema, FieldDef, FieldType, KeyScheme, REPL_ID_FIELD};
pub use store::{DataStore, InsertNotice, MemoryStore};
