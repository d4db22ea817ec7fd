// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replicator: priority-scheduled entity movement between two stores.
//!
//! A `Replicator` owns one source store, one destination store, and a
//! [`RegistrationTable`] of the entities eligible to move. Its background
//! scheduler wakes on a timer or on a source-side insert and, tier by tier,
//! pulls batches of entities from the source, inserts them into the
//! destination, and deletes them from the source.
//!
//! Replication here is a **move**, not a copy: the contract is at-least-once
//! delivery into the destination, with duplicates possible when the
//! destination insert lands but the source delete does not. Exactly-once is
//! explicitly not provided; no cross-store transaction exists.
//!
//! # Example
//!
//! ```rust,no_run
//! use datastore_sync::{MemoryStore, Replicator, ReplicatorConfig, ReplicationPriority};
//! use std::sync::Arc;
//!
//! # async fn example() -> datastore_sync::Result<()> {
//! let source = Arc::new(MemoryStore::new("edge"));
//! let destination = Arc::new(MemoryStore::new("hub"));
//!
//! let replicator = Replicator::new(source, destination, ReplicatorConfig::default())?;
//! replicator
//!     .register_named("Reading", "ReadingArchive", ReplicationPriority::High)
//!     .await?;
//! replicator.start();
//! // ... entities written to "Reading" on the source now drain to the hub
//! replicator.stop();
//! # Ok(())
//! # }
//! ```

mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::config::{ReplicatorConfig, MIN_REPLICATION_PERIOD_MS};
use crate::entity::EntityType;
use crate::error::{Result, StoreError};
use crate::registry::{RegistrationTable, ReplicationPriority};
use crate::schema::replicated_schema;
use crate::store::DataStore;

use worker::SchedulerContext;

/// Capacity of the data-replicated event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Raised once per scheduling cycle per priority tier in which at least one
/// entity was moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationEvent {
    pub priority: ReplicationPriority,
    pub entities_moved: usize,
}

/// One-directional, destructive entity transfer between two stores.
///
/// Constructed stopped; [`start`](Self::start) idempotently spawns the
/// scheduler task and [`stop`](Self::stop) requests cooperative shutdown
/// (observed once per cycle, never mid-batch). Nothing persists across
/// restarts: undelivered entities simply remain in the source store and are
/// picked up on the next cycle.
pub struct Replicator {
    source: Arc<dyn DataStore>,
    destination: Arc<dyn DataStore>,
    registry: Arc<RegistrationTable>,
    counts: Arc<Mutex<HashMap<String, u64>>>,
    period_ms: Arc<AtomicU64>,
    batch_cap: Arc<AtomicUsize>,
    create_identity_field: bool,
    dropped_key_fields: Arc<Mutex<HashMap<String, String>>>,
    event_tx: broadcast::Sender<ReplicationEvent>,
    /// Shutdown sender for the running scheduler, if any.
    scheduler: Mutex<Option<watch::Sender<bool>>>,
}

impl Replicator {
    /// Create a stopped replicator between `source` and `destination`.
    ///
    /// Fails with [`StoreError::Config`] if the configured replication
    /// period is below the 100 ms floor.
    pub fn new(
        source: Arc<dyn DataStore>,
        destination: Arc<dyn DataStore>,
        config: ReplicatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            source,
            destination,
            registry: Arc::new(RegistrationTable::new()),
            counts: Arc::new(Mutex::new(HashMap::new())),
            period_ms: Arc::new(AtomicU64::new(config.replication_period_ms)),
            batch_cap: Arc::new(AtomicUsize::new(config.max_batch_size)),
            create_identity_field: config.create_identity_field_in_replicated_table,
            dropped_key_fields: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            scheduler: Mutex::new(None),
        })
    }

    /// Register a declared entity type for replication.
    ///
    /// Registers `T`'s schema on the destination and seeds a zero
    /// transferred count. Re-registering updates the priority in place.
    pub async fn register_type<T: EntityType>(&self, priority: ReplicationPriority) -> Result<()> {
        self.destination.add_type(T::schema()).await?;
        self.registry.add_type::<T>(priority);
        self.seed_count(T::entity_name());
        info!(entity = T::entity_name(), "registered type for replication");
        Ok(())
    }

    /// Register a runtime-named entity for replication, renamed at the
    /// destination.
    ///
    /// Discovers the entity's shape from the source and registers a
    /// compatible schema on the destination under `remote_name` (defaulting
    /// to `local_name` when empty). The destination never shares the
    /// source's identity space: with
    /// `create_identity_field_in_replicated_table` set the source primary
    /// key is dropped in favor of a fresh auto-increment `ReplID` column
    /// (and stripped from each transferred row); otherwise the destination
    /// schema carries no key scheme.
    ///
    /// Registration failures (unknown entity, incompatible destination
    /// schema, missing primary key) surface synchronously: they are
    /// programmer errors, not runtime conditions.
    pub async fn register_named(
        &self,
        local_name: &str,
        remote_name: &str,
        priority: ReplicationPriority,
    ) -> Result<()> {
        let remote_name = if remote_name.is_empty() {
            local_name
        } else {
            remote_name
        };

        let schema = self.source.discover_schema(local_name).await?;
        let transformed = replicated_schema(&schema, remote_name, self.create_identity_field)?;
        if self.create_identity_field {
            // replicated_schema guarantees a key scheme exists here
            if let Some(key) = &schema.key_scheme {
                self.dropped_key_fields
                    .lock()
                    .expect("key field map lock poisoned")
                    .insert(local_name.to_string(), key.field_name.clone());
            }
        }
        self.destination.register_schema(transformed, true).await?;

        self.registry.add_name(local_name, remote_name, priority);
        self.seed_count(local_name);
        info!(
            entity = local_name,
            remote = remote_name,
            "registered named entity for replication"
        );
        Ok(())
    }

    /// Start the scheduler task. Idempotent: a second call while running is
    /// a no-op.
    pub fn start(&self) {
        let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
        if scheduler.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = SchedulerContext {
            source: Arc::clone(&self.source),
            destination: Arc::clone(&self.destination),
            registry: Arc::clone(&self.registry),
            counts: Arc::clone(&self.counts),
            period_ms: Arc::clone(&self.period_ms),
            batch_cap: Arc::clone(&self.batch_cap),
            dropped_key_fields: Arc::clone(&self.dropped_key_fields),
            event_tx: self.event_tx.clone(),
        };
        tokio::spawn(worker::run_scheduler(ctx, shutdown_rx));
        *scheduler = Some(shutdown_tx);
    }

    /// Request cooperative shutdown of the scheduler.
    ///
    /// The flag is observed once per scheduling cycle; an in-flight batch is
    /// not interrupted. Idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self
            .scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .take()
        {
            let _ = tx.send(true);
        }
    }

    /// Whether the scheduler task is currently running.
    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .is_some()
    }

    /// Change the scheduling period. Values below the 100 ms floor are
    /// rejected and the prior value stays in effect. May be called while
    /// running.
    pub fn set_replication_period(&self, period: Duration) -> Result<()> {
        let ms = period.as_millis() as u64;
        if ms < MIN_REPLICATION_PERIOD_MS {
            return Err(StoreError::Config(format!(
                "replication period {}ms is below the {}ms floor",
                ms, MIN_REPLICATION_PERIOD_MS
            )));
        }
        self.period_ms.store(ms, Ordering::SeqCst);
        Ok(())
    }

    /// The current scheduling period.
    pub fn replication_period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(Ordering::SeqCst))
    }

    /// Change the per-registration batch cap. 0 = unbounded. May be called
    /// while running.
    pub fn set_max_batch_size(&self, size: usize) {
        self.batch_cap.store(size, Ordering::SeqCst);
    }

    /// The current per-registration batch cap.
    pub fn max_batch_size(&self) -> usize {
        self.batch_cap.load(Ordering::SeqCst)
    }

    /// Entities transferred so far for a registration, by local name.
    pub fn count(&self, local_name: &str) -> u64 {
        self.counts
            .lock()
            .expect("transferred count lock poisoned")
            .get(local_name)
            .copied()
            .unwrap_or(0)
    }

    /// Zero all transferred counts.
    pub fn reset_counts(&self) {
        for value in self
            .counts
            .lock()
            .expect("transferred count lock poisoned")
            .values_mut()
        {
            *value = 0;
        }
    }

    /// Subscribe to data-replicated events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReplicationEvent> {
        self.event_tx.subscribe()
    }

    fn seed_count(&self, local_name: &str) {
        self.counts
            .lock()
            .expect("transferred count lock poisoned")
            .entry(local_name.to_string())
            .or_insert(0);
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.stop();
    }
}
