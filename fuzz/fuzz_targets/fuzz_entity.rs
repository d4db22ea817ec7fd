//! Fuzz target for entity payload operations.
//!
//! This tests that building a dynamic entity from arbitrary JSON and
//! running the transfer transforms (rename, field strip) never panics.

#![no_main]

use datastore_sync::entity::Entity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (String, String, String, String)| {
    let (name, json, remote, field) = data;

    let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(&json) else {
        return;
    };
    let entity = Entity::dynamic(name, fields);

    // Should never panic
    let renamed = entity.renamed(&remote);
    assert_eq!(renamed.entity_name(), remote);
    assert_eq!(renamed.fields(), entity.fields());

    let stripped = entity.without_field(&field);
    assert!(stripped.get(&field).is_none());
});
