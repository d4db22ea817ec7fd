//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Recovery queue depth and replay outcomes
//! - Abandoned (permanently dropped) writes
//! - Per-entity replication throughput
//! - Replication cycle errors
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `datasync_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state.

use metrics::{counter, gauge};

/// Record an item enqueued for recovery.
pub fn record_recovery_enqueued(store: &str) {
    counter!("datasync_recovery_enqueued_total", "store" => store.to_string()).increment(1);
}

/// Record an enqueue refused or displaced by the overflow policy.
pub fn record_recovery_overflow(store: &str, policy: &str) {
    counter!("datasync_recovery_overflow_total", "store" => store.to_string(), "policy" => policy.to_string()).increment(1);
}

/// Record a replay attempt outcome.
pub fn record_recovery_replay(store: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("datasync_recovery_replays_total", "store" => store.to_string(), "status" => status).increment(1);
}

/// Record an item abandoned after exhausting its retry budget.
pub fn record_recovery_abandoned(store: &str) {
    counter!("datasync_recovery_abandoned_total", "store" => store.to_string()).increment(1);
}

/// Set the current retry queue depth.
pub fn set_recovery_pending(store: &str, pending: usize) {
    gauge!("datasync_recovery_pending", "store" => store.to_string()).set(pending as f64);
}

/// Record entities moved for one registration in one cycle.
pub fn record_entities_replicated(entity: &str, count: usize) {
    counter!("datasync_entities_replicated_total", "entity" => entity.to_string())
        .increment(count as u64);
}

/// Record a failed registration within a replication cycle.
pub fn record_replication_error(entity: &str) {
    counter!("datasync_replication_errors_total", "entity" => entity.to_string()).increment(1);
}

/// Set whether a replicator's scheduler is running.
pub fn set_replicator_running(running: bool) {
    gauge!("datasync_replicator_running").set(if running { 1.0 } else { 0.0 });
}
