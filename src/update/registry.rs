//! In-flight registry of resources under active processing.
//!
//! Admission into the registry grants exclusive processing rights for a
//! resource. The returned [`InFlightGuard`] releases the entry when dropped,
//! so release happens exactly once on every exit path, including panics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::types::ResourceId;

use super::types::{ResourceType, UpdaterStatus};

/// Set of resource IDs currently being checked or updated.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    entries: Arc<Mutex<HashMap<ResourceId, ResourceType>>>,
}

impl InFlightRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to admit a resource.
    ///
    /// Returns `None` if another run already owns it.
    pub fn try_acquire(&self, id: &ResourceId, resource_type: ResourceType) -> Option<InFlightGuard> {
        let mut entries = self.lock();
        if entries.contains_key(id) {
            return None;
        }
        entries.insert(id.clone(), resource_type);
        Some(InFlightGuard {
            registry: self.clone(),
            id: id.clone(),
        })
    }

    /// Whether a resource is currently in flight.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of resources in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Consistent snapshot of the registry, split by resource type.
    pub fn snapshot(&self) -> UpdaterStatus {
        let entries = self.lock();
        let mut status = UpdaterStatus::default();
        for (id, resource_type) in entries.iter() {
            match resource_type {
                ResourceType::Container => status.container_ids.push(id.clone()),
                ResourceType::Project => status.project_ids.push(id.clone()),
                ResourceType::Image => status.image_ids.push(id.clone()),
            }
        }
        drop(entries);

        status.container_ids.sort();
        status.project_ids.sort();
        status.image_ids.sort();
        status.updating_containers = status.container_ids.len();
        status.updating_projects = status.project_ids.len();
        status.updating_images = status.image_ids.len();
        status
    }

    fn release(&self, id: &ResourceId) {
        if self.lock().remove(id).is_none() {
            tracing::warn!(resource_id = %id, "Released resource that was not in flight");
        }
    }

    // Entries stay consistent even if a holder panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceId, ResourceType>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive processing right for one resource.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    id: ResourceId,
}

impl InFlightGuard {
    /// The resource this guard holds.
    pub fn id(&self) -> &ResourceId {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}
