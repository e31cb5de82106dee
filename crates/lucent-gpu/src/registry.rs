//! Reference-counted registry for shared GPU resources.
//!
//! One packed buffer or image can be referenced by many logical owners
//! (objects, meshes, textures). The registry tracks a live-reference count
//! per opaque id and hands the resource back for destruction exactly when
//! the last owner releases it. The allocation map and the counter map
//! always hold the same key set; entries are inserted and removed as a
//! pair, never one without the other.
//!
//! The registry holds no device handles, so destruction stays with the
//! caller: [`ResourceRegistry::release`] returns the resource once its
//! count reaches zero and the caller tears it down. Like the rest of the
//! allocator, the registry is externally synchronized.

use crate::error::{GpuError, Result};
use std::collections::HashMap;

/// Opaque identifier for a registered resource.
pub type ResourceId = u32;

/// Reference-counted id → resource map.
pub struct ResourceRegistry<T> {
    resources: HashMap<ResourceId, T>,
    counters: HashMap<ResourceId, u32>,
    next_id: ResourceId,
}

impl<T> Default for ResourceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResourceRegistry<T> {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            counters: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a new resource with a reference count of one.
    pub fn register(&mut self, resource: T) -> ResourceId {
        self.register_with_count(resource, 1)
    }

    /// Register a new resource owned by `count` logical owners at once
    /// (a packed buffer shared by every object it was built from).
    ///
    /// Ids are compact: the counter restarts from zero whenever the
    /// registry has emptied.
    pub fn register_with_count(&mut self, resource: T, count: u32) -> ResourceId {
        debug_assert!(count > 0, "a registered resource needs at least one owner");

        if self.resources.is_empty() {
            self.next_id = 0;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.resources.insert(id, resource);
        self.counters.insert(id, count.max(1));

        id
    }

    /// Add one owner to an existing id.
    pub fn acquire(&mut self, id: ResourceId) -> Result<()> {
        let counter = self
            .counters
            .get_mut(&id)
            .ok_or(GpuError::ResourceNotFound(id))?;
        *counter += 1;
        Ok(())
    }

    /// Drop one owner from an existing id.
    ///
    /// When the count reaches zero the resource and its counter are removed
    /// together and the resource is returned for destruction. While the
    /// count is still nonzero, `None` is returned and the resource stays
    /// registered.
    pub fn release(&mut self, id: ResourceId) -> Result<Option<T>> {
        let counter = self
            .counters
            .get_mut(&id)
            .ok_or(GpuError::ResourceNotFound(id))?;
        *counter -= 1;

        if *counter > 0 {
            return Ok(None);
        }

        self.counters.remove(&id);
        let resource = self
            .resources
            .remove(&id)
            .ok_or(GpuError::ResourceNotFound(id))?;

        Ok(Some(resource))
    }

    /// Look up a registered resource.
    pub fn get(&self, id: ResourceId) -> Result<&T> {
        self.resources.get(&id).ok_or(GpuError::ResourceNotFound(id))
    }

    /// Look up a registered resource mutably.
    pub fn get_mut(&mut self, id: ResourceId) -> Result<&mut T> {
        self.resources
            .get_mut(&id)
            .ok_or(GpuError::ResourceNotFound(id))
    }

    /// Current reference count, zero for absent ids.
    pub fn count(&self, id: ResourceId) -> u32 {
        self.counters.get(&id).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Remove every resource regardless of its count, for full teardown
    /// after the device has gone idle.
    pub fn drain(&mut self) -> Vec<T> {
        self.counters.clear();
        self.resources.drain().map(|(_, resource)| resource).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_seeds_count_to_one() {
        let mut registry = ResourceRegistry::new();
        let id = registry.register("buffer");
        assert_eq!(registry.count(id), 1);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn counter_and_resource_maps_stay_paired() {
        let mut registry = ResourceRegistry::new();
        let a = registry.register(1);
        let b = registry.register(2);

        // count(id) == 0 exactly when the id is absent.
        assert!(registry.count(a) > 0 && registry.contains(a));
        assert!(registry.count(b) > 0 && registry.contains(b));

        assert!(registry.release(a).unwrap().is_some());
        assert_eq!(registry.count(a), 0);
        assert!(!registry.contains(a));
        assert!(registry.count(b) > 0 && registry.contains(b));
    }

    #[test]
    fn balanced_acquire_release_destroys_exactly_once() {
        let mut registry = ResourceRegistry::new();
        let id = registry.register("shared");

        let n = 4;
        for _ in 0..n - 1 {
            registry.acquire(id).unwrap();
        }

        let mut destroyed = 0;
        for _ in 0..n {
            if registry.release(id).unwrap().is_some() {
                destroyed += 1;
            }
        }

        assert_eq!(destroyed, 1);
        assert!(registry.is_empty());
        assert!(registry.release(id).is_err());
    }

    #[test]
    fn register_with_count_releases_per_owner() {
        let mut registry = ResourceRegistry::new();
        let id = registry.register_with_count("packed", 3);

        assert!(registry.release(id).unwrap().is_none());
        assert!(registry.release(id).unwrap().is_none());
        assert_eq!(registry.release(id).unwrap(), Some("packed"));
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_reset_once_registry_empties() {
        let mut registry = ResourceRegistry::new();
        let first = registry.register(10);
        let second = registry.register(20);
        assert_eq!((first, second), (0, 1));

        registry.release(first).unwrap();
        registry.release(second).unwrap();
        assert!(registry.is_empty());

        // Registry emptied, so the counter restarts for compact ids.
        assert_eq!(registry.register(30), 0);
    }

    #[test]
    fn ids_keep_growing_while_occupied() {
        let mut registry = ResourceRegistry::new();
        let first = registry.register(10);
        let second = registry.register(20);
        registry.release(second).unwrap();

        // Still occupied: no reset, no reuse of a live id.
        assert_eq!(registry.register(30), 2);
        assert!(registry.contains(first));
    }

    #[test]
    fn unknown_id_is_a_contract_violation() {
        let mut registry: ResourceRegistry<()> = ResourceRegistry::new();
        assert!(matches!(
            registry.acquire(7),
            Err(GpuError::ResourceNotFound(7))
        ));
        assert!(matches!(
            registry.release(7),
            Err(GpuError::ResourceNotFound(7))
        ));
        assert!(registry.get(7).is_err());
    }

    #[test]
    fn drain_empties_both_maps() {
        let mut registry = ResourceRegistry::new();
        registry.register_with_count(1, 2);
        registry.register(2);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.count(0), 0);
    }
}
