//! Live queries over the entity store.

use engine_component::{ComponentSet, Entity};

use crate::world::World;

/// A restartable position in a scan over entities holding a component set.
///
/// The cursor holds no borrow of the [`World`]: each [`QueryCursor::next`]
/// call takes the world by reference, so callers can add and remove
/// components, raise events, or destroy entities between steps. Slots are
/// visited in ascending order and each is visited once, so an entity is
/// never yielded twice. Entities created after the cursor started are
/// skipped, even when they reuse a slot that has not been visited yet.
#[derive(Debug, Clone)]
pub struct QueryCursor {
    required: ComponentSet,
    next_slot: u32,
    started: u64,
}

impl QueryCursor {
    pub(crate) fn new(required: ComponentSet, started: u64) -> Self {
        Self {
            required,
            next_slot: 0,
            started,
        }
    }

    /// The next matching entity, or `None` when the scan is done.
    pub fn next(&mut self, world: &World) -> Option<Entity> {
        while self.next_slot < world.slot_capacity() {
            let slot = self.next_slot;
            self.next_slot += 1;
            let Some(entity) = world.live_at(slot) else {
                continue;
            };
            let Some(record) = world.record(entity) else {
                continue;
            };
            if record.created < self.started
                && self
                    .required
                    .is_satisfied_by(|ty| record.components.contains_key(&ty))
            {
                return Some(entity);
            }
        }
        None
    }

    /// Start over, including every entity alive now.
    pub fn restart(&mut self, world: &World) {
        *self = world.query(self.required.clone());
    }

    /// Drain the remaining matches.
    pub fn remaining(mut self, world: &World) -> Vec<Entity> {
        let mut found = Vec::new();
        while let Some(entity) = self.next(world) {
            found.push(entity);
        }
        found
    }

    #[must_use]
    pub fn required(&self) -> &ComponentSet {
        &self.required
    }
}
