//! Fuzz target for the replicated-table schema transform.
//!
//! This tests that `replicated_schema` never panics on arbitrary schemas
//! and maintains its invariants: with an identity field the source key is
//! dropped and `ReplID` added; without one the key scheme is stripped.

#![no_main]

use datastore_sync::schema::{
    replicated_schema, EntitySchema, FieldDef, FieldType, KeyScheme, REPL_ID_FIELD,
};
use libfuzzer_sys::fuzz_target;

fn field_type(code: u8) -> FieldType {
    match code % 4 {
        0 => FieldType::Integer,
        1 => FieldType::Float,
        2 => FieldType::Text,
        _ => FieldType::Boolean,
    }
}

fuzz_target!(|data: (Vec<(String, u8)>, Option<(String, bool)>, String, bool)| {
    let (fields, key, remote_name, create_identity) = data;

    let mut schema = EntitySchema::new("Fuzzed");
    for (name, code) in fields {
        schema = schema.with_field(FieldDef::new(name, field_type(code)));
    }
    if let Some((key_field, auto)) = key {
        schema = schema.with_key(if auto {
            KeyScheme::identity(key_field)
        } else {
            KeyScheme::assigned(key_field)
        });
    }

    // Should never panic
    match replicated_schema(&schema, &remote_name, create_identity) {
        Ok(transformed) => {
            assert_eq!(transformed.name, remote_name);
            if create_identity {
                assert!(transformed.field(REPL_ID_FIELD).is_some());
                let key = transformed.key_scheme.as_ref().unwrap();
                assert_eq!(key.field_name, REPL_ID_FIELD);
                assert!(key.auto_increment);
            } else {
                assert!(transformed.key_scheme.is_none());
            }
            // Compatibility checking on the result must not panic either
            let _ = transformed.is_compatible_with(&schema);
        }
        // Only the missing-key case may fail
        Err(_) => assert!(create_identity && schema.key_scheme.is_none()),
    }
});
