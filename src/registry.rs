//! Entity registry access and panel-to-entity resolution.
//!
//! The registry itself belongs to the host platform. This crate only sees it
//! through [`EntityRegistry`], a read-only query, and [`EntityRegistrar`],
//! used once at setup to announce the panel lights.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one configuration entry; the scope registry queries run in.
pub type ConfigEntryId = Uuid;

/// Domain under which panel lights are registered.
pub const LIGHT_DOMAIN: &str = "light";

/// One row of the host's entity registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub entity_id: String,
    pub unique_id: String,
    pub device_id: String,
    pub domain: String,
    pub config_entry_id: ConfigEntryId,
}

/// The `{deviceId, entityId}` pair a gesture is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub device_id: String,
    pub entity_id: String,
}

impl From<&RegistryEntry> for EntityRef {
    fn from(entry: &RegistryEntry) -> Self {
        EntityRef {
            device_id: entry.device_id.clone(),
            entity_id: entry.entity_id.clone(),
        }
    }
}

/// Read-only view of the host registry.
pub trait EntityRegistry: Send + Sync {
    /// All entries owned by a configuration entry, in registration order.
    fn entries_for_config_entry(&self, config_entry_id: &ConfigEntryId) -> Vec<RegistryEntry>;

    /// All entries attached to a device.
    fn entries_for_device(&self, device_id: &str) -> Vec<RegistryEntry>;
}

/// Write side, used only when an entry is set up.
pub trait EntityRegistrar: Send + Sync {
    fn register(&self, entry: RegistryEntry);
}

/// Attribute a panel id to a registered light entity.
///
/// Scans the light entities of `scope` and returns the first whose unique id
/// equals the panel id. Never cached: the registry may change between calls.
pub fn resolve<R>(registry: &R, panel_id: u32, scope: &ConfigEntryId) -> Option<EntityRef>
where
    R: EntityRegistry + ?Sized,
{
    let unique_id = panel_id.to_string();
    registry
        .entries_for_config_entry(scope)
        .iter()
        .filter(|entry| entry.domain == LIGHT_DOMAIN)
        .find(|entry| entry.unique_id == unique_id)
        .map(EntityRef::from)
}

/// Simple registry kept in memory, for hosts without one and for tests.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry whose entity id matches. Returns whether any was removed.
    pub fn remove(&self, entity_id: &str) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| e.entity_id != entity_id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<RegistryEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<RegistryEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl EntityRegistry for InMemoryRegistry {
    fn entries_for_config_entry(&self, config_entry_id: &ConfigEntryId) -> Vec<RegistryEntry> {
        self.read()
            .iter()
            .filter(|e| &e.config_entry_id == config_entry_id)
            .cloned()
            .collect()
    }

    fn entries_for_device(&self, device_id: &str) -> Vec<RegistryEntry> {
        self.read()
            .iter()
            .filter(|e| e.device_id == device_id)
            .cloned()
            .collect()
    }
}

impl EntityRegistrar for InMemoryRegistry {
    /// Registering an existing entity id replaces the old row.
    fn register(&self, entry: RegistryEntry) {
        let mut entries = self.write();
        match entries.iter_mut().find(|e| e.entity_id == entry.entity_id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }
}
