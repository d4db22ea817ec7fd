//! A [`DataStore`] wrapper with scripted failure injection.
//!
//! Wraps a [`MemoryStore`] and fails operations on demand so tests can
//! exercise retry exhaustion, FIFO replay order, and at-least-once delivery
//! under partial failure. All insert attempts (including failed ones) are
//! recorded for ordering assertions.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use datastore_sync::entity::Entity;
use datastore_sync::error::StoreError;
use datastore_sync::schema::EntitySchema;
use datastore_sync::store::{BoxFuture, DataStore, InsertNotice, MemoryStore};
use tokio::sync::broadcast;

/// Memory-backed store that fails on cue.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    /// Remaining insert calls to fail. `usize::MAX` = fail forever.
    fail_inserts: AtomicUsize,
    /// Whether delete calls fail.
    fail_deletes: AtomicBool,
    /// Artificial latency added to every insert, in milliseconds.
    insert_delay_ms: AtomicU64,
    /// Every insert attempt in call order, successful or not.
    insert_attempts: Mutex<Vec<Entity>>,
}

impl FlakyStore {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(MemoryStore::new(name)),
            fail_inserts: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
            insert_delay_ms: AtomicU64::new(0),
            insert_attempts: Mutex::new(Vec::new()),
        }
    }

    /// Access the wrapped store (row counts, schema registration).
    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    /// Fail the next `n` insert calls with a recoverable error.
    #[allow(dead_code)] // Recovery suite only
    pub fn fail_next_inserts(&self, n: usize) {
        self.fail_inserts.store(n, Ordering::SeqCst);
    }

    /// Fail every insert until told otherwise.
    #[allow(dead_code)] // Recovery suite only
    pub fn fail_all_inserts(&self) {
        self.fail_inserts.store(usize::MAX, Ordering::SeqCst);
    }

    /// Stop failing inserts.
    #[allow(dead_code)] // Recovery suite only
    pub fn heal_inserts(&self) {
        self.fail_inserts.store(0, Ordering::SeqCst);
    }

    /// Toggle delete failure.
    #[allow(dead_code)] // Replication suite only
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Hold every insert open for `delay` before it completes or fails,
    /// widening the in-flight window for tests that need to observe it.
    #[allow(dead_code)] // Recovery suite only
    pub fn delay_inserts(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// All insert attempts so far, in call order.
    #[allow(dead_code)] // Useful for future tests
    pub fn insert_attempts(&self) -> Vec<Entity> {
        self.insert_attempts.lock().unwrap().clone()
    }

    /// Number of insert attempts so far.
    #[allow(dead_code)] // Recovery suite only
    pub fn insert_attempt_count(&self) -> usize {
        self.insert_attempts.lock().unwrap().len()
    }

    fn take_insert_failure(&self) -> bool {
        let remaining = self.fail_inserts.load(Ordering::SeqCst);
        if remaining == 0 {
            return false;
        }
        if remaining != usize::MAX {
            self.fail_inserts.store(remaining - 1, Ordering::SeqCst);
        }
        true
    }
}

impl DataStore for FlakyStore {
    fn store_name(&self) -> &str {
        self.inner.store_name()
    }

    fn insert(
        &self,
        entity: Entity,
        insert_references: bool,
        is_recovery_replay: bool,
    ) -> BoxFuture<'_, ()> {
        self.insert_attempts.lock().unwrap().push(entity.clone());
        let fail = self.take_insert_failure();
        let delay = Duration::from_millis(self.insert_delay_ms.load(Ordering::SeqCst));
        let inner = Arc::clone(&self.inner);
        let name = self.inner.store_name().to_string();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(StoreError::unavailable(name, "insert", "injected failure"));
            }
            inner.insert(entity, insert_references, is_recovery_replay).await
        })
    }

    fn select(&self, entity_name: &str) -> BoxFuture<'_, Vec<Entity>> {
        self.inner.select(entity_name)
    }

    fn delete<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            let name = self.inner.store_name().to_string();
            return Box::pin(async move {
                Err(StoreError::unavailable(name, "delete", "injected failure"))
            });
        }
        self.inner.delete(entity)
    }

    fn add_type(&self, schema: EntitySchema) -> BoxFuture<'_, ()> {
        self.inner.add_type(schema)
    }

    fn discover_schema(&self, entity_name: &str) -> BoxFuture<'_, EntitySchema> {
        self.inner.discover_schema(entity_name)
    }

    fn register_schema(
        &self,
        schema: EntitySchema,
        ensure_compatibility: bool,
    ) -> BoxFuture<'_, ()> {
        self.inner.register_schema(schema, ensure_compatibility)
    }

    fn subscribe_inserts(&self) -> broadcast::Receiver<InsertNotice> {
        self.inner.subscribe_inserts()
    }
}
