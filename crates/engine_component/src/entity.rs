//! Entity handles and generational allocation.
//!
//! An [`Entity`] is an opaque `(slot, generation)` pair with no inherent data.
//! When an entity is freed its slot's generation is bumped, so any handle
//! still held for the old occupant compares unequal to every handle issued
//! afterwards and fails liveness checks instead of aliasing the new entity.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A generational entity handle.
///
/// Handles are cheap to copy and safe to hold across ticks: an entity that
/// has been destroyed simply stops being alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// The null handle. Never alive.
    pub const NULL: Entity = Entity {
        index: u32::MAX,
        generation: 0,
    };

    /// Create a handle from its raw parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The slot this handle points at.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// The generation of the slot when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns `true` for the [`Entity::NULL`] sentinel.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX
    }

    /// Pack the handle into a single `u64` (generation in the upper half).
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`Entity::to_bits`].
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.index, self.generation)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Allocates entity handles, recycling freed slots under a new generation.
///
/// A slot whose generation counter is exhausted is retired rather than
/// recycled, so a generation value is never issued twice for the same slot.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh handle.
    pub fn allocate(&mut self) -> Entity {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return Entity::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            alive: true,
        });
        Entity::new(index, 1)
    }

    /// Frees a live handle, invalidating every copy of it.
    ///
    /// Returns `false` if the handle was already stale or null.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.index() as usize];
        slot.alive = false;
        self.live -= 1;
        if slot.generation == u32::MAX {
            // Retired: recycling would eventually reissue a stale generation.
            return true;
        }
        slot.generation += 1;
        self.free.push(entity.index());
        true
    }

    /// Returns `true` if `entity` refers to a currently allocated slot
    /// at the same generation.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        self.slots
            .get(entity.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation())
    }

    /// Returns the live handle occupying `index`, if any.
    #[must_use]
    pub fn live_at(&self, index: u32) -> Option<Entity> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.alive)
            .map(|slot| Entity::new(index, slot.generation))
    }

    /// Number of slots ever allocated (live or not).
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of live entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.live
    }
}

/// Collects the entity handles held by a field value.
///
/// Handles may be stored as `Entity`, `Option<Entity>` or `Vec<Entity>`;
/// any other value yields nothing. Null handles are skipped.
#[must_use]
pub fn entity_refs(value: &dyn Any) -> Vec<Entity> {
    let refs = if let Some(entity) = value.downcast_ref::<Entity>() {
        vec![*entity]
    } else if let Some(entity) = value.downcast_ref::<Option<Entity>>() {
        entity.iter().copied().collect()
    } else if let Some(entities) = value.downcast_ref::<Vec<Entity>>() {
        entities.clone()
    } else {
        Vec::new()
    };
    refs.into_iter().filter(|e| !e.is_null()).collect()
}

/// Rewrites every entity handle held by a field value through `map`.
///
/// Supports the same shapes as [`entity_refs`]. A handle mapped to
/// [`Entity::NULL`] is cleared (`None` for options, dropped from vectors).
pub fn remap_entity_refs(value: &mut dyn Any, map: &mut dyn FnMut(Entity) -> Entity) {
    if let Some(entity) = value.downcast_mut::<Entity>() {
        *entity = map(*entity);
    } else if let Some(entity) = value.downcast_mut::<Option<Entity>>() {
        *entity = entity.map(&mut *map).filter(|e| !e.is_null());
    } else if let Some(entities) = value.downcast_mut::<Vec<Entity>>() {
        let remapped: Vec<Entity> = entities.iter().map(|e| map(*e)).collect();
        *entities = remapped.into_iter().filter(|e| !e.is_null()).collect();
    }
}

/// Returns `true` if values of `type_id` can hold entity handles in a shape
/// understood by [`entity_refs`] and [`remap_entity_refs`].
#[must_use]
pub fn is_entity_container(type_id: std::any::TypeId) -> bool {
    use std::any::TypeId;
    type_id == TypeId::of::<Entity>()
        || type_id == TypeId::of::<Option<Entity>>()
        || type_id == TypeId::of::<Vec<Entity>>()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_null_entity_is_never_alive() {
        let alloc = EntityAllocator::new();
        assert!(Entity::NULL.is_null());
        assert!(!alloc.is_alive(Entity::NULL));
        assert_eq!(Entity::default(), Entity::NULL);
    }

    #[test]
    fn test_allocator_produces_unique_handles() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        let e3 = alloc.allocate();
        assert_ne!(e1, e2);
        assert_ne!(e2, e3);
        assert_eq!(alloc.count(), 3);
        assert!(alloc.is_alive(e1) && alloc.is_alive(e2) && alloc.is_alive(e3));
    }

    #[test]
    fn test_freed_slot_is_reused_with_new_generation() {
        let mut alloc = EntityAllocator::new();
        let old = alloc.allocate();
        assert!(alloc.free(old));
        let new = alloc.allocate();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!alloc.is_alive(old));
        assert!(alloc.is_alive(new));
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.free(e));
        assert!(!alloc.free(e));
        assert_eq!(alloc.count(), 0);
    }

    #[test]
    fn test_no_two_live_handles_equal_under_churn() {
        let mut alloc = EntityAllocator::new();
        let mut live: Vec<Entity> = Vec::new();
        let mut ever: HashSet<Entity> = HashSet::new();
        for round in 0..50u32 {
            for _ in 0..4 {
                let e = alloc.allocate();
                assert!(ever.insert(e), "handle {e} issued twice");
                live.push(e);
            }
            if round % 2 == 0 {
                let victim = live.remove((round as usize) % live.len());
                assert!(alloc.free(victim));
            }
        }
        let distinct: HashSet<_> = live.iter().copied().collect();
        assert_eq!(distinct.len(), live.len());
    }

    #[test]
    fn test_exhausted_generation_retires_slot() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        alloc.slots[e.index() as usize].generation = u32::MAX;
        let last = Entity::new(e.index(), u32::MAX);
        assert!(alloc.free(last));
        let next = alloc.allocate();
        assert_ne!(next.index(), e.index());
    }

    #[test]
    fn test_bits_roundtrip() {
        let e = Entity::new(7, 3);
        assert_eq!(Entity::from_bits(e.to_bits()), e);
    }

    #[test]
    fn test_entity_refs_shapes() {
        let a = Entity::new(1, 1);
        let b = Entity::new(2, 1);
        assert_eq!(entity_refs(&a), vec![a]);
        assert_eq!(entity_refs(&Some(b)), vec![b]);
        assert_eq!(entity_refs(&vec![a, Entity::NULL, b]), vec![a, b]);
        assert!(entity_refs(&5u32).is_empty());
    }

    #[test]
    fn test_remap_clears_unmapped_handles() {
        let a = Entity::new(1, 1);
        let b = Entity::new(2, 1);
        let mut list = vec![a, b];
        remap_entity_refs(&mut list, &mut |e| if e == a { Entity::new(9, 1) } else { Entity::NULL });
        assert_eq!(list, vec![Entity::new(9, 1)]);

        let mut single = Some(b);
        remap_entity_refs(&mut single, &mut |_| Entity::NULL);
        assert_eq!(single, None);
    }

    #[test]
    fn test_entity_serialization_roundtrip() {
        let entity = Entity::new(999, 4);
        let bytes = rmp_serde::to_vec(&entity).unwrap();
        let restored: Entity = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(entity, restored);
    }
}
