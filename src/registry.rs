// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The registration table: which entities replicate, and in what order.
//!
//! Registrations come in two kinds: *type* registrations for declared
//! [`EntityType`]s and *name* registrations for runtime-named entities (the
//! latter optionally renamed at the destination). Each carries a priority
//! tier; the replicator's scheduler drains tiers strictly High → Normal →
//! Low, and within a tier processes registrations in the order they were
//! added.
//!
//! The table is read by the scheduler task and mutated by application
//! threads, so every operation takes one coarse lock.

use std::any::TypeId;
use std::sync::Mutex;

use crate::entity::EntityType;

/// Priority tier of a registration.
///
/// Governs processing order across registrations, not fairness: a saturated
/// higher tier can starve lower tiers within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationPriority {
    High,
    Normal,
    Low,
}

impl ReplicationPriority {
    /// All tiers, most significant first. Scheduler iteration order.
    pub const ALL: [ReplicationPriority; 3] = [
        ReplicationPriority::High,
        ReplicationPriority::Normal,
        ReplicationPriority::Low,
    ];
}

/// Registration of a declared entity type.
#[derive(Debug, Clone)]
pub struct TypeRegistration {
    pub type_id: TypeId,
    pub entity_name: &'static str,
    pub priority: ReplicationPriority,
}

/// Registration of a runtime-named entity, optionally renamed remotely.
#[derive(Debug, Clone)]
pub struct NameRegistration {
    pub local_name: String,
    pub remote_name: String,
    pub priority: ReplicationPriority,
}

#[derive(Default)]
struct Tables {
    /// Type registrations in registration order.
    types: Vec<TypeRegistration>,
    /// Name registrations in registration order.
    names: Vec<NameRegistration>,
}

/// Thread-safe ordered record of replication-eligible entities.
///
/// At most one registration exists per distinct type and per distinct local
/// name; re-registering updates the priority in place without disturbing
/// registration order.
#[derive(Default)]
pub struct RegistrationTable {
    inner: Mutex<Tables>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declared type, or update its priority if already present.
    pub fn add_type<T: EntityType>(&self, priority: ReplicationPriority) {
        self.add_type_entry(TypeId::of::<T>(), T::entity_name(), priority);
    }

    /// Non-generic form of [`add_type`](Self::add_type).
    pub fn add_type_entry(
        &self,
        type_id: TypeId,
        entity_name: &'static str,
        priority: ReplicationPriority,
    ) {
        let mut tables = self.inner.lock().expect("registration table lock poisoned");
        if let Some(existing) = tables.types.iter_mut().find(|r| r.type_id == type_id) {
            existing.priority = priority;
            return;
        }
        tables.types.push(TypeRegistration {
            type_id,
            entity_name,
            priority,
        });
    }

    /// Register a named entity, or update its priority if already present.
    ///
    /// `remote_name` defaults to `local_name` when empty.
    pub fn add_name(
        &self,
        local_name: impl Into<String>,
        remote_name: impl Into<String>,
        priority: ReplicationPriority,
    ) {
        let local_name = local_name.into();
        let remote_name = {
            let r = remote_name.into();
            if r.is_empty() {
                local_name.clone()
            } else {
                r
            }
        };

        let mut tables = self.inner.lock().expect("registration table lock poisoned");
        if let Some(existing) = tables
            .names
            .iter_mut()
            .find(|r| r.local_name == local_name)
        {
            existing.priority = priority;
            existing.remote_name = remote_name;
            return;
        }
        tables.names.push(NameRegistration {
            local_name,
            remote_name,
            priority,
        });
    }

    /// Remove a type registration.
    pub fn remove_type<T: EntityType>(&self) {
        let type_id = TypeId::of::<T>();
        let mut tables = self.inner.lock().expect("registration table lock poisoned");
        tables.types.retain(|r| r.type_id != type_id);
    }

    /// Remove a name registration.
    pub fn remove_name(&self, local_name: &str) {
        let mut tables = self.inner.lock().expect("registration table lock poisoned");
        tables.names.retain(|r| r.local_name != local_name);
    }

    /// Whether a type registration exists.
    pub fn contains_type<T: EntityType>(&self) -> bool {
        self.get_type_registration::<T>().is_some()
    }

    /// Whether a name registration exists.
    pub fn contains_name(&self, local_name: &str) -> bool {
        self.get_name_registration(local_name).is_some()
    }

    /// Fetch a type registration.
    pub fn get_type_registration<T: EntityType>(&self) -> Option<TypeRegistration> {
        let type_id = TypeId::of::<T>();
        let tables = self.inner.lock().expect("registration table lock poisoned");
        tables.types.iter().find(|r| r.type_id == type_id).cloned()
    }

    /// Fetch a name registration.
    pub fn get_name_registration(&self, local_name: &str) -> Option<NameRegistration> {
        let tables = self.inner.lock().expect("registration table lock poisoned");
        tables
            .names
            .iter()
            .find(|r| r.local_name == local_name)
            .cloned()
    }

    /// Type registrations in exactly one tier, in registration order.
    pub fn type_registrations(&self, priority: ReplicationPriority) -> Vec<TypeRegistration> {
        let tables = self.inner.lock().expect("registration table lock poisoned");
        tables
            .types
            .iter()
            .filter(|r| r.priority == priority)
            .cloned()
            .collect()
    }

    /// Name registrations in exactly one tier, in registration order.
    pub fn name_registrations(&self, priority: ReplicationPriority) -> Vec<NameRegistration> {
        let tables = self.inner.lock().expect("registration table lock poisoned");
        tables
            .names
            .iter()
            .filter(|r| r.priority == priority)
            .cloned()
            .collect()
    }

    /// Whether any registration (type or name) covers the given local name.
    ///
    /// Used by the replicator's wake filter on the source's insert channel.
    pub fn is_registered(&self, entity_name: &str) -> bool {
        let tables = self.inner.lock().expect("registration table lock poisoned");
        tables.types.iter().any(|r| r.entity_name == entity_name)
            || tables.names.iter().any(|r| r.local_name == entity_name)
    }

    /// Total registration count across both kinds.
    pub fn len(&self) -> usize {
        let tables = self.inner.lock().expect("registration table lock poisoned");
        tables.types.len() + tables.names.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
