// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replication scheduler task.
//!
//! One task per [`Replicator`](super::Replicator), parked on a
//! timer-or-signal select between cycles:
//!
//! - the timer fires every replication period;
//! - a wake signal fires when the source store reports an insert on a
//!   registered entity, letting fresh data move ahead of the period (an
//!   in-flight cycle is never preempted);
//! - shutdown wins over both.
//!
//! Within a cycle, priority tiers run strictly High → Normal → Low and a
//! saturated tier can starve the ones below it. A failing registration is
//! logged and skipped; the rest of the cycle still runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info};

use crate::entity::Entity;
use crate::error::Result;
use crate::metrics;
use crate::registry::{RegistrationTable, ReplicationPriority};
use crate::store::{DataStore, InsertNotice};

use super::ReplicationEvent;

/// Everything the scheduler task needs, cloned out of the `Replicator`.
pub(super) struct SchedulerContext {
    pub source: Arc<dyn DataStore>,
    pub destination: Arc<dyn DataStore>,
    pub registry: Arc<RegistrationTable>,
    pub counts: Arc<Mutex<HashMap<String, u64>>>,
    pub period_ms: Arc<AtomicU64>,
    pub batch_cap: Arc<AtomicUsize>,
    /// Source key field stripped from rows of name registrations that got a
    /// fresh identity column at the destination. Keyed by local name.
    pub dropped_key_fields: Arc<Mutex<HashMap<String, String>>>,
    pub event_tx: broadcast::Sender<ReplicationEvent>,
}

pub(super) async fn run_scheduler(ctx: SchedulerContext, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        source = %ctx.source.store_name(),
        destination = %ctx.destination.store_name(),
        "replication scheduler started"
    );
    metrics::set_replicator_running(true);

    let mut insert_rx = Some(ctx.source.subscribe_inserts());

    loop {
        if wait_for_tick(&ctx, &mut insert_rx, &mut shutdown_rx).await {
            break;
        }
        run_cycle(&ctx).await;
    }

    metrics::set_replicator_running(false);
    info!("replication scheduler stopped");
}

/// Park until the period elapses or a registered-entity insert lands.
/// Returns `true` when shutdown was requested.
async fn wait_for_tick(
    ctx: &SchedulerContext,
    insert_rx: &mut Option<broadcast::Receiver<InsertNotice>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let period = Duration::from_millis(ctx.period_ms.load(Ordering::SeqCst));
    let sleep = tokio::time::sleep(period);
    tokio::pin!(sleep);

    loop {
        let wake_enabled = insert_rx.is_some();
        tokio::select! {
            _ = &mut sleep => return false,
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    return true;
                }
            }
            notice = async { insert_rx.as_mut().expect("guarded by wake_enabled").recv().await },
                if wake_enabled =>
            {
                match notice {
                    Ok(notice) => {
                        if ctx.registry.is_registered(&notice.entity_name) {
                            debug!(entity = %notice.entity_name, "woken by source insert");
                            return false;
                        }
                        // Unregistered entity: keep waiting without resetting the timer
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Notices were lost; one of them may have been registered
                        debug!(missed, "insert channel lagged, running a cycle");
                        return false;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Source dropped its notifier; fall back to the timer alone
                        *insert_rx = None;
                    }
                }
            }
        }
    }
}

/// One scheduling cycle over every tier and registration.
async fn run_cycle(ctx: &SchedulerContext) {
    for tier in ReplicationPriority::ALL {
        let mut moved = 0;

        for reg in ctx.registry.type_registrations(tier) {
            moved += replicate_registration(ctx, reg.entity_name, reg.entity_name, None).await;
        }
        for reg in ctx.registry.name_registrations(tier) {
            let drop_field = ctx
                .dropped_key_fields
                .lock()
                .expect("key field map lock poisoned")
                .get(&reg.local_name)
                .cloned();
            moved +=
                replicate_registration(ctx, &reg.local_name, &reg.remote_name, drop_field).await;
        }

        if moved > 0 {
            // One event per tier per cycle, not one per entity
            let _ = ctx.event_tx.send(ReplicationEvent {
                priority: tier,
                entities_moved: moved,
            });
        }
    }
}

/// Move up to the batch cap of one registration's entities from source to
/// destination. Errors are absorbed here so the rest of the cycle runs.
async fn replicate_registration(
    ctx: &SchedulerContext,
    local_name: &str,
    remote_name: &str,
    drop_field: Option<String>,
) -> usize {
    let rows = match ctx.source.select(local_name).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(entity = %local_name, error = %e, "failed to fetch entities for replication");
            metrics::record_replication_error(local_name);
            return 0;
        }
    };

    let cap = ctx.batch_cap.load(Ordering::SeqCst);
    let take = if cap == 0 { rows.len() } else { rows.len().min(cap) };
    let mut moved = 0;

    for entity in rows.into_iter().take(take) {
        if let Err(e) = move_entity(ctx, &entity, remote_name, drop_field.as_deref()).await {
            error!(entity = %local_name, error = %e, "entity transfer failed, deferring registration to next cycle");
            metrics::record_replication_error(local_name);
            break;
        }
        moved += 1;
        *ctx.counts
            .lock()
            .expect("transferred count lock poisoned")
            .entry(local_name.to_string())
            .or_insert(0) += 1;

        // Bound CPU usage between transfers
        tokio::task::yield_now().await;
    }

    if moved > 0 {
        metrics::record_entities_replicated(local_name, moved);
        debug!(entity = %local_name, moved, "registration replicated");
    }
    moved
}

/// Insert a renamed copy at the destination, then delete the original.
///
/// The two operations are independent and non-atomic: if the delete fails
/// (or the process dies between them) the entity is fetched and inserted
/// again next cycle. At-least-once, never silent loss.
async fn move_entity(
    ctx: &SchedulerContext,
    entity: &Entity,
    remote_name: &str,
    drop_field: Option<&str>,
) -> Result<()> {
    let mut outgoing = entity.renamed(remote_name);
    if let Some(field) = drop_field {
        outgoing = outgoing.without_field(field);
    }

    ctx.destination.insert(outgoing, false, false).await?;
    ctx.source.delete(entity).await?;
    Ok(())
}
