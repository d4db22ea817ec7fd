// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recovery Service: bounded retry queue + background replay worker.
//!
//! When a store insert fails with a recoverable error, the operation is
//! parked in a capacity-bounded FIFO owned by that store's Recovery Service.
//! A single background task replays queued inserts oldest-first, counting
//! retries per item and abandoning an item once its budget is exhausted.
//!
//! # Worker Cycle
//!
//! 1. If the service is disabled, skip to the sleep.
//! 2. Peek (not pop) the oldest item, mark it in-flight, replay it with the
//!    re-enqueue-suppressing flag set.
//! 3. On success: pop it, count it recovered, pause briefly so a recovering
//!    backend isn't saturated with back-to-back replays, continue draining.
//! 4. On failure: bump the item's retry count (abandoning it past the
//!    budget) and stop draining, since a replay failure is assumed correlated
//!    with store unavailability and further attempts this cycle are futile.
//! 5. Sleep for the retry period (interruptible by shutdown) and repeat.
//!
//! Replay failures are never surfaced to callers; only the `abandoned`
//! counter records permanent loss. The worker never panics the process.
//!
//! # Queue Invariant
//!
//! The queue's visible length always reflects "items not yet durably
//! written": the in-flight item stays counted until it is either replayed
//! successfully or abandoned.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{OverflowPolicy, RecoveryConfig};
use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::metrics;
use crate::store::DataStore;

/// A failed insert parked for replay.
#[derive(Debug, Clone)]
struct RecoverableItem {
    entity: Entity,
    insert_references: bool,
    retry_count: u32,
}

/// Snapshot of a Recovery Service's counters.
///
/// `recovered` and `abandoned` accumulate until [`RecoveryService::reset_stats`];
/// `pending` is the current queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryStats {
    pub pending: usize,
    pub recovered: u64,
    pub abandoned: u64,
}

/// Capacity-bounded FIFO of pending replays.
struct RetryQueue {
    items: VecDeque<RecoverableItem>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl RetryQueue {
    fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Append an item, applying the overflow policy at capacity.
    ///
    /// Returns the displaced oldest item under `DropOldest`.
    fn enqueue(&mut self, item: RecoverableItem) -> Result<Option<RecoverableItem>> {
        let displaced = if self.items.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Reject => {
                    return Err(StoreError::RecoveryQueueFull {
                        capacity: self.capacity,
                    })
                }
                OverflowPolicy::DropOldest => self.items.pop_front(),
            }
        } else {
            None
        };
        self.items.push_back(item);
        Ok(displaced)
    }
}

struct RecoveryShared {
    queue: Mutex<RetryQueue>,
    /// Payload of the item currently being replayed, if any.
    working: Mutex<Option<Entity>>,
    enabled: AtomicBool,
    recovered: AtomicU64,
    abandoned: AtomicU64,
    retries_before_abandon: AtomicU32,
    retry_period_ms: AtomicU64,
}

/// Retry queue plus background replay worker for one store.
///
/// Constructed disabled. The first [`set_enabled(true)`](Self::set_enabled)
/// lazily spawns exactly one worker task; disabling afterwards pauses
/// processing without stopping the task. Dropping the service (or calling
/// [`shutdown`](Self::shutdown)) stops the worker cooperatively.
pub struct RecoveryService {
    store: Arc<dyn DataStore>,
    shared: Arc<RecoveryShared>,
    replay_pause: Duration,
    worker_spawned: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl RecoveryService {
    /// Create a disabled service owning a retry queue for `store`.
    pub fn new(store: Arc<dyn DataStore>, config: RecoveryConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            shared: Arc::new(RecoveryShared {
                queue: Mutex::new(RetryQueue::new(config.retry_buffer_depth, config.overflow)),
                working: Mutex::new(None),
                enabled: AtomicBool::new(false),
                recovered: AtomicU64::new(0),
                abandoned: AtomicU64::new(0),
                retries_before_abandon: AtomicU32::new(config.retries_before_abandon),
                retry_period_ms: AtomicU64::new(config.retry_period_ms),
            }),
            replay_pause: config.replay_pause(),
            worker_spawned: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Enable or disable processing.
    ///
    /// The first enable spawns the worker; later enables are no-ops on the
    /// task. Disabling pauses replay at the next cycle boundary.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
        if enabled && !self.worker_spawned.swap(true, Ordering::SeqCst) {
            let store = Arc::clone(&self.store);
            let shared = Arc::clone(&self.shared);
            let replay_pause = self.replay_pause;
            let shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(run_worker(store, shared, replay_pause, shutdown_rx));
        }
    }

    /// Whether processing is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Park a failed insert for replay.
    ///
    /// No-op while the service is disabled, and no-op when the in-flight
    /// working item already equals `entity` (repeated callers hitting the
    /// same failing item must not duplicate it). At capacity the configured
    /// [`OverflowPolicy`] applies.
    pub fn queue_insert_for_recovery(&self, entity: Entity, insert_references: bool) -> Result<()> {
        if !self.is_enabled() {
            debug!(store = %self.store.store_name(), "recovery disabled, dropping enqueue");
            return Ok(());
        }

        {
            let working = self.shared.working.lock().expect("working lock poisoned");
            if working.as_ref() == Some(&entity) {
                debug!(store = %self.store.store_name(), "item already in flight, enqueue suppressed");
                return Ok(());
            }
        }

        let store_name = self.store.store_name();
        let mut queue = self.shared.queue.lock().expect("retry queue lock poisoned");
        match queue.enqueue(RecoverableItem {
            entity,
            insert_references,
            retry_count: 0,
        }) {
            Ok(None) => {}
            Ok(Some(_dropped)) => {
                warn!(store = %store_name, "retry queue full, dropped oldest pending item");
                metrics::record_recovery_overflow(store_name, "drop_oldest");
            }
            Err(e) => {
                metrics::record_recovery_overflow(store_name, "reject");
                return Err(e);
            }
        }
        let pending = queue.items.len();
        drop(queue);

        metrics::record_recovery_enqueued(store_name);
        metrics::set_recovery_pending(store_name, pending);
        Ok(())
    }

    /// Insert through the store, routing recoverable failures into the queue.
    ///
    /// This is the decision policy the core owns: a failure the store
    /// classifies recoverable is absorbed (the write will be replayed);
    /// anything else propagates to the caller.
    pub async fn insert_with_recovery(&self, entity: Entity, insert_references: bool) -> Result<()> {
        match self
            .store
            .insert(entity.clone(), insert_references, false)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if self.store.is_recoverable_error(&e) => {
                warn!(
                    store = %self.store.store_name(),
                    error = %e,
                    "insert failed recoverably, queueing for replay"
                );
                self.queue_insert_for_recovery(entity, insert_references)
            }
            Err(e) => Err(e),
        }
    }

    /// Snapshot the counters.
    pub fn stats(&self) -> RecoveryStats {
        let pending = self
            .shared
            .queue
            .lock()
            .expect("retry queue lock poisoned")
            .items
            .len();
        RecoveryStats {
            pending,
            recovered: self.shared.recovered.load(Ordering::SeqCst),
            abandoned: self.shared.abandoned.load(Ordering::SeqCst),
        }
    }

    /// Zero the accumulated `recovered` / `abandoned` counters.
    pub fn reset_stats(&self) {
        self.shared.recovered.store(0, Ordering::SeqCst);
        self.shared.abandoned.store(0, Ordering::SeqCst);
    }

    /// Change the per-item retry budget.
    pub fn set_retries_before_abandon(&self, retries: u32) {
        self.shared
            .retries_before_abandon
            .store(retries, Ordering::SeqCst);
    }

    /// Change the pause between drain cycles.
    pub fn set_retry_period(&self, period: Duration) {
        self.shared
            .retry_period_ms
            .store(period.as_millis() as u64, Ordering::SeqCst);
    }

    /// Request cooperative worker shutdown.
    ///
    /// Observed at the next suspension point; an in-progress replay is not
    /// interrupted.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for RecoveryService {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Sleep that returns `true` when shutdown was requested instead.
async fn shutdown_or_sleep(duration: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        res = shutdown_rx.changed() => res.is_err() || *shutdown_rx.borrow(),
    }
}

async fn run_worker(
    store: Arc<dyn DataStore>,
    shared: Arc<RecoveryShared>,
    replay_pause: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let store_name = store.store_name().to_string();
    info!(store = %store_name, "recovery worker started");

    loop {
        if shared.enabled.load(Ordering::SeqCst) {
            if drain_queue(&store, &shared, &store_name, replay_pause, &mut shutdown_rx).await {
                break;
            }
        }

        let period = Duration::from_millis(shared.retry_period_ms.load(Ordering::SeqCst));
        if shutdown_or_sleep(period, &mut shutdown_rx).await {
            break;
        }
    }

    info!(store = %store_name, "recovery worker stopped");
}

/// Replay queued items oldest-first until the queue empties or a replay
/// fails. Returns `true` when shutdown was requested mid-drain.
async fn drain_queue(
    store: &Arc<dyn DataStore>,
    shared: &RecoveryShared,
    store_name: &str,
    replay_pause: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        // Peek, don't pop: the item stays visible until durably written.
        let item = {
            let queue = shared.queue.lock().expect("retry queue lock poisoned");
            queue.items.front().cloned()
        };
        let Some(item) = item else {
            return false;
        };

        *shared.working.lock().expect("working lock poisoned") = Some(item.entity.clone());
        let result = store
            .insert(item.entity.clone(), item.insert_references, true)
            .await;
        *shared.working.lock().expect("working lock poisoned") = None;

        match result {
            Ok(()) => {
                let pending = {
                    let mut queue = shared.queue.lock().expect("retry queue lock poisoned");
                    // The DropOldest policy may have displaced the in-flight
                    // item while we were replaying it; only pop our own.
                    if queue.items.front().map(|f| &f.entity) == Some(&item.entity) {
                        queue.items.pop_front();
                    }
                    queue.items.len()
                };
                shared.recovered.fetch_add(1, Ordering::SeqCst);
                metrics::record_recovery_replay(store_name, true);
                metrics::set_recovery_pending(store_name, pending);
                debug!(store = %store_name, entity = %item.entity.entity_name(), pending, "replay succeeded");

                if shutdown_or_sleep(replay_pause, shutdown_rx).await {
                    return true;
                }
            }
            Err(e) => {
                metrics::record_recovery_replay(store_name, false);
                let budget = shared.retries_before_abandon.load(Ordering::SeqCst);
                let (abandoned, pending) = {
                    let mut queue = shared.queue.lock().expect("retry queue lock poisoned");
                    let abandoned = match queue.items.front_mut() {
                        Some(front) if front.entity == item.entity => {
                            front.retry_count += 1;
                            if front.retry_count > budget {
                                queue.items.pop_front();
                                true
                            } else {
                                false
                            }
                        }
                        // Displaced by DropOldest mid-replay
                        _ => false,
                    };
                    (abandoned, queue.items.len())
                };
                metrics::set_recovery_pending(store_name, pending);

                if abandoned {
                    shared.abandoned.fetch_add(1, Ordering::SeqCst);
                    metrics::record_recovery_abandoned(store_name);
                    warn!(
                        store = %store_name,
                        entity = %item.entity.entity_name(),
                        error = %e,
                        "retry budget exhausted, abandoning item"
                    );
                } else {
                    debug!(store = %store_name, error = %e, "replay failed, will retry");
                }

                // The failure is assumed correlated with store availability;
                // trying the next item this cycle would be futile.
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldDef, FieldType};
    use crate::store::MemoryStore;
    use serde_json::{json, Map};

    fn reading(seq: i64) -> Entity {
        let mut fields = Map::new();
        fields.insert("seq".to_string(), json!(seq));
        Entity::dynamic("Reading", fields)
    }

    fn reading_schema() -> EntitySchema {
        EntitySchema::new("Reading").with_field(FieldDef::new("seq", FieldType::Integer))
    }

    async fn online_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new("primary"));
        store.register_schema(reading_schema(), true).await.unwrap();
        store
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met within 2s");
    }

    #[test]
    fn test_retry_queue_reject_at_capacity() {
        let mut queue = RetryQueue::new(2, OverflowPolicy::Reject);
        queue
            .enqueue(RecoverableItem {
                entity: reading(1),
                insert_references: false,
                retry_count: 0,
            })
            .unwrap();
        queue
            .enqueue(RecoverableItem {
                entity: reading(2),
                insert_references: false,
                retry_count: 0,
            })
            .unwrap();

        let err = queue
            .enqueue(RecoverableItem {
                entity: reading(3),
                insert_references: false,
                retry_count: 0,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::RecoveryQueueFull { capacity: 2 }));
        assert_eq!(queue.items.len(), 2);
    }

    #[test]
    fn test_retry_queue_drop_oldest_at_capacity() {
        let mut queue = RetryQueue::new(2, OverflowPolicy::DropOldest);
        for seq in 1..=2 {
            queue
                .enqueue(RecoverableItem {
                    entity: reading(seq),
                    insert_references: false,
                    retry_count: 0,
                })
                .unwrap();
        }

        let displaced = queue
            .enqueue(RecoverableItem {
                entity: reading(3),
                insert_references: false,
                retry_count: 0,
            })
            .unwrap()
            .expect("oldest should be displaced");
        assert_eq!(displaced.entity, reading(1));
        assert_eq!(queue.items.len(), 2);
        assert_eq!(queue.items.front().unwrap().entity, reading(2));
    }

    #[tokio::test]
    async fn test_enqueue_noop_while_disabled() {
        let store = online_store().await;
        let service = RecoveryService::new(store, RecoveryConfig::for_testing());

        service.queue_insert_for_recovery(reading(1), false).unwrap();
        assert_eq!(service.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_enqueue_and_stats() {
        let store = online_store().await;
        store.set_offline(true);
        let service = RecoveryService::new(store.clone(), RecoveryConfig::for_testing());
        service.set_enabled(true);

        service.queue_insert_for_recovery(reading(1), false).unwrap();
        service.queue_insert_for_recovery(reading(2), false).unwrap();

        let stats = service.stats();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.recovered, 0);
        service.shutdown();
    }

    #[tokio::test]
    async fn test_worker_replays_when_store_recovers() {
        let store = online_store().await;
        store.set_offline(true);
        let service = RecoveryService::new(store.clone(), RecoveryConfig::for_testing());
        service.set_enabled(true);
        service.set_retries_before_abandon(u32::MAX);

        service.queue_insert_for_recovery(reading(1), false).unwrap();
        store.set_offline(false);

        wait_until(|| service.stats().recovered == 1).await;
        assert_eq!(service.stats().pending, 0);
        assert_eq!(store.row_count("Reading").await, 1);
        service.shutdown();
    }

    #[tokio::test]
    async fn test_disabled_service_pauses_replay() {
        let store = online_store().await;
        store.set_offline(true);
        let service = RecoveryService::new(store.clone(), RecoveryConfig::for_testing());
        service.set_enabled(true);
        service.queue_insert_for_recovery(reading(1), false).unwrap();

        // Pause processing, then bring the store back: nothing should move.
        service.set_enabled(false);
        store.set_offline(false);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(service.stats().pending, 1);
        assert_eq!(service.stats().recovered, 0);

        // Re-enable (idempotent, no second worker) and watch it drain.
        service.set_enabled(true);
        service.set_enabled(true);
        wait_until(|| service.stats().recovered == 1).await;
        service.shutdown();
    }

    #[tokio::test]
    async fn test_insert_with_recovery_absorbs_recoverable_failure() {
        let store = online_store().await;
        let service = RecoveryService::new(store.clone(), RecoveryConfig::for_testing());
        service.set_enabled(true);

        // Online: straight through, nothing queued
        service.insert_with_recovery(reading(1), false).await.unwrap();
        assert_eq!(service.stats().pending, 0);

        // Offline: absorbed into the queue
        store.set_offline(true);
        service.insert_with_recovery(reading(2), false).await.unwrap();
        assert_eq!(service.stats().pending, 1);
        service.shutdown();
    }

    #[tokio::test]
    async fn test_insert_with_recovery_propagates_permanent_failure() {
        let store = Arc::new(MemoryStore::new("primary"));
        let service = RecoveryService::new(store, RecoveryConfig::for_testing());
        service.set_enabled(true);

        // Unknown entity is a programmer error, not a transient condition.
        let err = service.insert_with_recovery(reading(1), false).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownEntity(_)));
        assert_eq!(service.stats().pending, 0);
        service.shutdown();
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let store = online_store().await;
        store.set_offline(true);
        let service = RecoveryService::new(store.clone(), RecoveryConfig::for_testing());
        service.set_enabled(true);
        service.queue_insert_for_recovery(reading(1), false).unwrap();
        store.set_offline(false);

        wait_until(|| service.stats().recovered == 1).await;
        service.reset_stats();
        let stats = service.stats();
        assert_eq!(stats.recovered, 0);
        assert_eq!(stats.abandoned, 0);
        service.shutdown();
    }
}
