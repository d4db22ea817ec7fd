//! Fuzz target for config deserialization.
//!
//! This tests that parsing `RecoveryConfig` / `ReplicatorConfig` from
//! arbitrary JSON never panics, and that validation never panics on
//! whatever parsing accepts.

#![no_main]

use datastore_sync::config::{RecoveryConfig, ReplicatorConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(config) = serde_json::from_str::<RecoveryConfig>(data) {
        let _ = config.retry_period();
        let _ = config.replay_pause();
    }
    if let Ok(config) = serde_json::from_str::<ReplicatorConfig>(data) {
        // Validation may reject, it must not panic
        let _ = config.validate();
        let _ = config.replication_period();
    }
});
