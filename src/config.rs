//! Configuration for the recovery and replication services.
//!
//! Both services take a plain config struct at construction. Configs can be
//! built programmatically or deserialized from YAML/JSON; every field has a
//! default matching the framework's historical behavior.
//!
//! # Quick Start
//!
//! ```rust
//! use datastore_sync::config::{RecoveryConfig, ReplicatorConfig};
//!
//! let recovery = RecoveryConfig {
//!     retries_before_abandon: 10,
//!     ..Default::default()
//! };
//!
//! let replicator = ReplicatorConfig {
//!     replication_period_ms: 1_000,
//!     max_batch_size: 25,
//!     ..Default::default()
//! };
//! assert!(replicator.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Floor for the replication period. Values below this are rejected.
pub const MIN_REPLICATION_PERIOD_MS: u64 = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// RecoveryConfig: retry queue tuning
// ═══════════════════════════════════════════════════════════════════════════════

/// What a full retry queue does with a new item.
///
/// The historical ring-buffer behavior was unspecified; the policy is an
/// explicit knob here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the enqueue with [`StoreError::RecoveryQueueFull`](crate::StoreError::RecoveryQueueFull).
    #[default]
    Reject,
    /// Silently drop the oldest pending item to make room.
    DropOldest,
}

/// Recovery Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Replay failures tolerated per item before it is abandoned.
    #[serde(default = "default_retries_before_abandon")]
    pub retries_before_abandon: u32,

    /// Pause between drain cycles, in milliseconds.
    #[serde(default = "default_retry_period_ms")]
    pub retry_period_ms: u64,

    /// Retry queue capacity.
    #[serde(default = "default_retry_buffer_depth")]
    pub retry_buffer_depth: usize,

    /// Pause after each successful replay, in milliseconds. Keeps a recovering
    /// backend from being saturated with back-to-back replays.
    #[serde(default = "default_replay_pause_ms")]
    pub replay_pause_ms: u64,

    /// Behavior when the queue is at capacity.
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_retries_before_abandon() -> u32 {
    6
}

fn default_retry_period_ms() -> u64 {
    30_000
}

fn default_retry_buffer_depth() -> usize {
    100
}

fn default_replay_pause_ms() -> u64 {
    1_000
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retries_before_abandon: 6,
            retry_period_ms: 30_000,
            retry_buffer_depth: 100,
            replay_pause_ms: 1_000,
            overflow: OverflowPolicy::Reject,
        }
    }
}

impl RecoveryConfig {
    /// Fast-cycling config for tests.
    pub fn for_testing() -> Self {
        Self {
            retries_before_abandon: 2,
            retry_period_ms: 25,
            retry_buffer_depth: 10,
            replay_pause_ms: 1,
            overflow: OverflowPolicy::Reject,
        }
    }

    /// The drain-cycle pause as a [`Duration`].
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }

    /// The post-replay pause as a [`Duration`].
    pub fn replay_pause(&self) -> Duration {
        Duration::from_millis(self.replay_pause_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicatorConfig: scheduler tuning
// ═══════════════════════════════════════════════════════════════════════════════

/// Replicator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Scheduler cycle period in milliseconds. Floor is
    /// [`MIN_REPLICATION_PERIOD_MS`]; a wake signal from the source store can
    /// start a cycle sooner.
    #[serde(default = "default_replication_period_ms")]
    pub replication_period_ms: u64,

    /// Entities moved per registration per cycle. 0 = unbounded.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Whether replicated tables registered by name receive a fresh
    /// auto-increment `ReplID` column in place of the source primary key.
    /// When unset, the destination schema is registered with no key scheme.
    #[serde(default)]
    pub create_identity_field_in_replicated_table: bool,
}

fn default_replication_period_ms() -> u64 {
    5_000
}

fn default_max_batch_size() -> usize {
    50
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            replication_period_ms: 5_000,
            max_batch_size: 50,
            create_identity_field_in_replicated_table: false,
        }
    }
}

impl ReplicatorConfig {
    /// Fast-cycling config for tests.
    pub fn for_testing() -> Self {
        Self {
            replication_period_ms: MIN_REPLICATION_PERIOD_MS,
            max_batch_size: 50,
            create_identity_field_in_replicated_table: false,
        }
    }

    /// The cycle period as a [`Duration`].
    pub fn replication_period(&self) -> Duration {
        Duration::from_millis(self.replication_period_ms)
    }

    /// Check the period floor.
    pub fn validate(&self) -> Result<()> {
        if self.replication_period_ms < MIN_REPLICATION_PERIOD_MS {
            return Err(StoreError::Config(format!(
                "replication period {}ms is below the {}ms floor",
                self.replication_period_ms, MIN_REPLICATION_PERIOD_MS
            )));
        }
        Ok(())
    }
}
