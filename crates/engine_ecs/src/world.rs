//! Entity Store.
//!
//! The [`World`] owns every component value of one module environment.
//! Entities are generational handles; every operation that takes a handle
//! checks it first and reports a dead handle as [`WorldError::EntityNotFound`],
//! `None` or `false`, never as a panic.
//!
//! Component changes raise the lifecycle events [`OnAdded`], [`OnChanged`]
//! and [`BeforeRemoved`] through the world's [`EventRouter`]. Dispatch is
//! synchronous: handlers run, and may re-enter the world, before the
//! mutating call returns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use engine_component::{
    BeforeRemoved, Children, Component, ComponentRecord, ComponentSet, ComponentTypeId, Entity,
    EntityAllocator, Event, OnAdded, OnChanged, Parent, Reflect, entity_refs, is_entity_container,
    remap_entity_refs,
};
use engine_prefab::PrefabStore;
use engine_reflect::{TypeDescriptor, TypeKind, TypeLibrary};
use tracing::{debug, trace, warn};

use crate::error::WorldError;
use crate::query::QueryCursor;
use crate::router::{EventRouter, HandlerId, Subscription};

/// What [`World::add_component`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentChange {
    /// The entity did not have the component before.
    Added,
    /// An existing component was replaced.
    Changed,
}

#[derive(Debug)]
pub(crate) struct EntityRecord {
    /// Creation sequence number; queries skip entities newer than themselves.
    pub(crate) created: u64,
    pub(crate) components: HashMap<ComponentTypeId, Box<dyn Reflect>>,
    /// World revision at which each component value was attached.
    attached: HashMap<ComponentTypeId, u64>,
}

/// The entity store of one module environment.
pub struct World {
    library: Arc<TypeLibrary>,
    prefabs: Arc<PrefabStore>,
    allocator: EntityAllocator,
    records: Vec<Option<EntityRecord>>,
    counts: HashMap<ComponentTypeId, usize>,
    router: EventRouter,
    sequence: u64,
    revision: u64,
    destroying: HashSet<Entity>,
}

impl World {
    /// An empty world over `library` and `prefabs`.
    #[must_use]
    pub fn new(library: Arc<TypeLibrary>, prefabs: Arc<PrefabStore>) -> Self {
        Self {
            library,
            prefabs,
            allocator: EntityAllocator::new(),
            records: Vec::new(),
            counts: HashMap::new(),
            router: EventRouter::new(),
            sequence: 0,
            revision: 0,
            destroying: HashSet::new(),
        }
    }

    /// An empty world with no prefabs.
    #[must_use]
    pub fn with_library(library: Arc<TypeLibrary>) -> Self {
        let prefabs = Arc::new(PrefabStore::empty(Arc::clone(&library)));
        Self::new(library, prefabs)
    }

    #[must_use]
    pub fn library(&self) -> &Arc<TypeLibrary> {
        &self.library
    }

    #[must_use]
    pub fn prefabs(&self) -> &Arc<PrefabStore> {
        &self.prefabs
    }

    #[must_use]
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    // -- Entity lifecycle --

    /// Allocate an entity with no components.
    pub fn create(&mut self) -> Entity {
        self.spawn()
    }

    /// Create an entity holding `components`. Raises [`OnAdded`] for each
    /// component type once all of them are attached; if any value is not a
    /// registered component, nothing is created.
    pub fn create_with(
        &mut self,
        components: impl IntoIterator<Item = Box<dyn Reflect>>,
    ) -> Result<Entity, WorldError> {
        let entity = self.spawn();
        let mut added = Vec::new();
        for value in components {
            let attached = self
                .component_id_of(value.as_ref())
                .and_then(|id| self.attach(entity, id, value).map(|change| (id, change)));
            match attached {
                Ok((id, ComponentChange::Added)) => added.push(id),
                Ok((_, ComponentChange::Changed)) => {}
                Err(err) => {
                    self.discard(entity);
                    return Err(err);
                }
            }
        }
        for component in added {
            self.dispatch(entity, OnAdded { component });
        }
        Ok(entity)
    }

    /// Instantiate a prefab and, recursively, its child prefabs.
    ///
    /// Children are linked with [`Children`] on the parent and [`Parent`] on
    /// each child. The whole graph is built before any [`OnAdded`] is raised;
    /// if any part fails, every entity created by this call is discarded
    /// and the error is returned.
    pub fn create_from(&mut self, prefab: &str) -> Result<Entity, WorldError> {
        let mut created = Vec::new();
        let mut pending = Vec::new();
        match self.instantiate(prefab, None, &mut created, &mut pending) {
            Ok(root) => {
                debug!(prefab, entity = %root, entities = created.len(), "prefab instantiated");
                for (entity, component) in pending {
                    if self.is_alive(entity) {
                        self.dispatch(entity, OnAdded { component });
                    }
                }
                Ok(root)
            }
            Err(err) => {
                for entity in created.into_iter().rev() {
                    self.discard(entity);
                }
                warn!(prefab, error = %err, "prefab instantiation rolled back");
                Err(err)
            }
        }
    }

    fn instantiate(
        &mut self,
        name: &str,
        parent: Option<Entity>,
        created: &mut Vec<Entity>,
        pending: &mut Vec<(Entity, ComponentTypeId)>,
    ) -> Result<Entity, WorldError> {
        let flat = self.prefabs.flatten(name)?;
        let entity = self.spawn();
        created.push(entity);

        for (component, value) in flat.components {
            self.attach(entity, component, value)?;
            pending.push((entity, component));
        }
        if let Some(parent) = parent {
            self.attach(entity, Parent::component_type_id(), Box::new(Parent { entity: parent }))?;
            pending.push((entity, Parent::component_type_id()));
        }
        if !flat.children.is_empty() {
            let mut children = Vec::with_capacity(flat.children.len());
            for child in &flat.children {
                children.push(self.instantiate(child, Some(entity), created, pending)?);
            }
            let id = Children::component_type_id();
            let change = match self.get_mut_unchecked::<Children>(entity) {
                Some(existing) => {
                    existing.entities.extend(children);
                    ComponentChange::Changed
                }
                None => self.attach(entity, id, Box::new(Children { entities: children }))?,
            };
            if change == ComponentChange::Added {
                pending.push((entity, id));
            }
        }
        Ok(entity)
    }

    /// Destroy an entity and, first, every entity it owns.
    ///
    /// Owned entities are destroyed depth-first, innermost first. For each
    /// entity, [`BeforeRemoved`] is raised for every component (in type id
    /// order) while all of them are still attached; then the components are
    /// dropped and the handle is invalidated.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.ensure_alive(entity)?;
        if self.destroying.contains(&entity) {
            return Ok(());
        }
        let mut visited = HashSet::new();
        self.destroy_recursive(entity, &mut visited);
        Ok(())
    }

    fn destroy_recursive(&mut self, entity: Entity, visited: &mut HashSet<Entity>) {
        if !visited.insert(entity) || !self.is_alive(entity) || self.destroying.contains(&entity) {
            return;
        }
        self.destroying.insert(entity);
        for owned in self.owned_entities(entity) {
            self.destroy_recursive(owned, visited);
        }
        let mut types = self.component_types(entity);
        types.sort();
        for component in types {
            if self.has_component(entity, component) {
                self.dispatch(entity, BeforeRemoved { component });
            }
        }
        self.destroying.remove(&entity);
        if self.is_alive(entity) {
            trace!(entity = %entity, "entity destroyed");
            self.discard(entity);
        }
    }

    /// Entities referenced by owning fields of `entity`'s components.
    fn owned_entities(&self, entity: Entity) -> Vec<Entity> {
        let Some(record) = self.record(entity) else {
            return Vec::new();
        };
        let mut types: Vec<_> = record.components.keys().copied().collect();
        types.sort();
        let mut owned = Vec::new();
        for ty in types {
            let Some(descriptor) = self.library.component(ty) else {
                continue;
            };
            let value = &record.components[&ty];
            for field in descriptor.owning_fields() {
                if let Some(field_value) = value.field(field.name()) {
                    owned.extend(entity_refs(field_value));
                }
            }
        }
        owned
    }

    /// Deep-copy an entity together with every entity it owns.
    ///
    /// Owning references in the copies point at the copied entities. Other
    /// handle fields are redirected to a copy when they referenced an entity
    /// inside the copied graph and kept as-is otherwise.
    pub fn copy_entity(&mut self, entity: Entity) -> Result<Entity, WorldError> {
        self.ensure_alive(entity)?;
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.collect_owned(entity, &mut visited, &mut order);

        let mut mapping = HashMap::with_capacity(order.len());
        for &source in &order {
            let copy = self.spawn();
            mapping.insert(source, copy);
        }

        match self.copy_graph(&order, &mapping) {
            Ok(pending) => {
                for (entity, component) in pending {
                    if self.is_alive(entity) {
                        self.dispatch(entity, OnAdded { component });
                    }
                }
                Ok(mapping[&entity])
            }
            Err(err) => {
                for &copy in mapping.values() {
                    self.discard(copy);
                }
                Err(err)
            }
        }
    }

    fn collect_owned(&self, entity: Entity, visited: &mut HashSet<Entity>, order: &mut Vec<Entity>) {
        if !visited.insert(entity) || !self.is_alive(entity) {
            return;
        }
        order.push(entity);
        for owned in self.owned_entities(entity) {
            self.collect_owned(owned, visited, order);
        }
    }

    fn copy_graph(
        &mut self,
        order: &[Entity],
        mapping: &HashMap<Entity, Entity>,
    ) -> Result<Vec<(Entity, ComponentTypeId)>, WorldError> {
        let library = Arc::clone(&self.library);
        let mut pending = Vec::new();
        for source in order {
            let target = mapping[source];
            let mut types = self.component_types(*source);
            types.sort();
            for ty in types {
                let descriptor = library
                    .component(ty)
                    .ok_or_else(|| WorldError::UnregisteredComponent(format!("{ty:?}")))?;
                let Some(value) = self.get_by_id(*source, ty) else {
                    continue;
                };
                let mut copy = descriptor.copy_value(value)?;
                remap_handles(descriptor, copy.as_mut(), mapping);
                self.attach(target, ty, copy)?;
                pending.push((target, ty));
            }
        }
        Ok(pending)
    }

    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.allocator.count()
    }

    /// Live entities in slot order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        (0..self.allocator.capacity())
            .filter_map(|index| self.allocator.live_at(index))
            .collect()
    }

    // -- Component operations --

    /// Attach `value`, replacing any component of the same type.
    ///
    /// Raises [`OnChanged`] when a value was replaced and [`OnAdded`]
    /// otherwise, exactly once either way.
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<ComponentChange, WorldError> {
        self.add_boxed(entity, Box::new(value))
    }

    /// Type-erased [`World::add_component`].
    pub fn add_boxed(
        &mut self,
        entity: Entity,
        value: Box<dyn Reflect>,
    ) -> Result<ComponentChange, WorldError> {
        self.ensure_alive(entity)?;
        let component = self.component_id_of(value.as_ref())?;
        let change = self.attach(entity, component, value)?;
        match change {
            ComponentChange::Added => {
                self.dispatch(entity, OnAdded { component });
            }
            ComponentChange::Changed => {
                self.dispatch(entity, OnChanged { component });
            }
        }
        Ok(change)
    }

    /// Remove component `T`. Returns `false` if the entity did not have it.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<bool, WorldError> {
        self.remove_by_id(entity, T::component_type_id())
    }

    /// Remove a component by type id.
    ///
    /// [`BeforeRemoved`] is raised while the value is still attached, so
    /// handlers can read its final state. A value a handler attaches in its
    /// place (remove then add, or a replacing add) is kept.
    pub fn remove_by_id(
        &mut self,
        entity: Entity,
        component: ComponentTypeId,
    ) -> Result<bool, WorldError> {
        self.ensure_alive(entity)?;
        let Some(revision) = self.attached_revision(entity, component) else {
            return Ok(false);
        };
        self.dispatch(entity, BeforeRemoved { component });
        if self.attached_revision(entity, component) == Some(revision) {
            self.detach(entity, component);
        } else {
            debug!(entity = %entity, ?component, "component replaced during removal, keeping it");
        }
        Ok(true)
    }

    /// Borrow component `T`. `None` if the entity is dead or lacks it.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.get_by_id(entity, T::component_type_id())?
            .downcast_ref::<T>()
    }

    #[must_use]
    pub fn get_by_id(&self, entity: Entity, component: ComponentTypeId) -> Option<&dyn Reflect> {
        self.record(entity)?
            .components
            .get(&component)
            .map(|value| &**value)
    }

    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.has_component(entity, T::component_type_id())
    }

    #[must_use]
    pub fn has_component(&self, entity: Entity, component: ComponentTypeId) -> bool {
        self.record(entity)
            .is_some_and(|record| record.components.contains_key(&component))
    }

    /// Update component `T` in place, then raise [`OnChanged`].
    pub fn modify<T: Component, R>(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, WorldError> {
        self.ensure_alive(entity)?;
        let value = self
            .get_mut_unchecked::<T>(entity)
            .ok_or_else(|| WorldError::MissingComponent {
                entity,
                component: T::type_name().to_string(),
            })?;
        let result = f(value);
        self.dispatch(
            entity,
            OnChanged {
                component: T::component_type_id(),
            },
        );
        Ok(result)
    }

    /// Component types attached to `entity`. Empty for dead handles.
    #[must_use]
    pub fn component_types(&self, entity: Entity) -> Vec<ComponentTypeId> {
        self.record(entity)
            .map(|record| record.components.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live entities holding component `T`.
    #[must_use]
    pub fn component_count<T: Component>(&self) -> usize {
        self.component_count_of(T::component_type_id())
    }

    #[must_use]
    pub fn component_count_of(&self, component: ComponentTypeId) -> usize {
        self.counts.get(&component).copied().unwrap_or(0)
    }

    // -- Queries --

    /// A cursor over entities holding every type in `required`.
    ///
    /// The cursor does not borrow the world, so the caller may mutate it
    /// between steps. Entities created after the cursor was made are not
    /// yielded, and no entity is yielded twice.
    #[must_use]
    pub fn query(&self, required: ComponentSet) -> QueryCursor {
        QueryCursor::new(required, self.sequence)
    }

    /// Iterate entities holding every type in `required`.
    pub fn iter_matching(&self, required: ComponentSet) -> impl Iterator<Item = Entity> + '_ {
        let mut cursor = self.query(required);
        std::iter::from_fn(move || cursor.next(self))
    }

    /// Iterate entities holding `T`, with the component.
    pub fn iter_with<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.iter_matching(ComponentSet::new().with::<T>())
            .filter_map(move |entity| self.get::<T>(entity).map(|value| (entity, value)))
    }

    // -- Events --

    /// Register a handler. Its event and required components must be
    /// registered in this world's type library.
    pub fn subscribe(&mut self, subscription: Subscription) -> Result<HandlerId, WorldError> {
        if !self.library.contains_event(subscription.event_type()) {
            return Err(WorldError::UnregisteredEvent(
                subscription.event_name().to_string(),
            ));
        }
        if let Some(missing) = subscription
            .required()
            .iter()
            .find(|ty| !self.library.contains_component(*ty))
        {
            return Err(WorldError::UnregisteredComponent(format!("{missing:?}")));
        }
        Ok(self.router.subscribe(subscription))
    }

    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.router.unsubscribe(id)
    }

    /// Remove every handler registered by `owner`.
    pub fn unsubscribe_owner(&mut self, owner: &str) -> usize {
        self.router.unsubscribe_owner(owner)
    }

    /// Dispatch `event` against `entity` and return it once every matching
    /// handler has run or one has consumed it.
    pub fn send<E: Event>(&mut self, entity: Entity, event: E) -> Result<E, WorldError> {
        self.ensure_alive(entity)?;
        if !self.library.contains_event(E::event_type_id()) {
            return Err(WorldError::UnregisteredEvent(E::type_name().to_string()));
        }
        Ok(self.dispatch(entity, event))
    }

    fn dispatch<E: Event>(&mut self, entity: Entity, mut event: E) -> E {
        let subject = event.subject_component();
        let handlers = self.router.matching(E::event_type_id(), subject, |ty| {
            self.has_component(entity, ty)
        });
        trace!(event = E::type_name(), entity = %entity, handlers = handlers.len(), "dispatch");
        for entry in handlers {
            // Earlier handlers may have destroyed the entity or removed a
            // required component.
            if !entry
                .required()
                .is_satisfied_by(|ty| self.has_component(entity, ty))
                || !self.is_alive(entity)
            {
                continue;
            }
            let handler = Arc::clone(entry.handler());
            handler(self, entity, &mut event);
            if E::is_consumable() && event.is_consumed() {
                break;
            }
        }
        event
    }

    // -- Replication --

    /// Encode the replicated fields of every component of `entity` that has
    /// any, in type id order. Fields without the replicated marker are left
    /// out of the payload.
    pub fn replicated_records(&self, entity: Entity) -> Result<Vec<ComponentRecord>, WorldError> {
        let record = self.record(entity).ok_or(WorldError::EntityNotFound(entity))?;
        let mut types: Vec<_> = record.components.keys().copied().collect();
        types.sort();
        let mut records = Vec::new();
        for ty in types {
            let Some(descriptor) = self.library.component(ty) else {
                continue;
            };
            let Some(codec) = descriptor.codec() else {
                continue;
            };
            if !descriptor.is_replicated() {
                continue;
            }
            let fields = replicated_fields(descriptor);
            records.push(ComponentRecord {
                entity,
                component_type: ty,
                data: codec.encode_fields(record.components[&ty].as_any(), &fields)?,
            });
        }
        Ok(records)
    }

    /// Apply a record's replicated fields to its entity. The fields are
    /// merged onto the entity's current value, or onto a blank value if the
    /// entity lacks the component, so local-only fields are never touched.
    pub fn apply_record(&mut self, record: &ComponentRecord) -> Result<ComponentChange, WorldError> {
        let library = Arc::clone(&self.library);
        let descriptor = library
            .component(record.component_type)
            .ok_or_else(|| WorldError::UnregisteredComponent(format!("{:?}", record.component_type)))?;
        let codec = descriptor
            .codec()
            .ok_or_else(|| WorldError::UnregisteredComponent(descriptor.uri().to_string()))?;
        self.ensure_alive(record.entity)?;

        let fields = replicated_fields(descriptor);
        let merged = match self.get_by_id(record.entity, record.component_type) {
            Some(current) => codec.merge_fields(current.as_any(), &record.data, &fields)?,
            None => codec.merge_fields(descriptor.blank().as_any(), &record.data, &fields)?,
        };
        self.add_boxed(record.entity, merged)
    }

    // -- Internals --

    fn spawn(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        let index = entity.index() as usize;
        if self.records.len() <= index {
            self.records.resize_with(index + 1, || None);
        }
        self.records[index] = Some(EntityRecord {
            created: self.sequence,
            components: HashMap::new(),
            attached: HashMap::new(),
        });
        self.sequence += 1;
        entity
    }

    /// Drop an entity and its components without raising events.
    fn discard(&mut self, entity: Entity) {
        if !self.allocator.is_alive(entity) {
            return;
        }
        if let Some(record) = self.records[entity.index() as usize].take() {
            for ty in record.components.keys() {
                self.decrement(*ty);
            }
        }
        self.allocator.free(entity);
    }

    fn attach(
        &mut self,
        entity: Entity,
        component: ComponentTypeId,
        value: Box<dyn Reflect>,
    ) -> Result<ComponentChange, WorldError> {
        self.revision += 1;
        let revision = self.revision;
        let record = self.record_mut(entity).ok_or(WorldError::EntityNotFound(entity))?;
        record.attached.insert(component, revision);
        match record.components.insert(component, value) {
            Some(_) => Ok(ComponentChange::Changed),
            None => {
                *self.counts.entry(component).or_insert(0) += 1;
                Ok(ComponentChange::Added)
            }
        }
    }

    fn detach(&mut self, entity: Entity, component: ComponentTypeId) -> Option<Box<dyn Reflect>> {
        let record = self.record_mut(entity)?;
        record.attached.remove(&component);
        let value = record.components.remove(&component)?;
        self.decrement(component);
        Some(value)
    }

    fn attached_revision(&self, entity: Entity, component: ComponentTypeId) -> Option<u64> {
        self.record(entity)?.attached.get(&component).copied()
    }

    fn decrement(&mut self, component: ComponentTypeId) {
        if let Some(count) = self.counts.get_mut(&component) {
            *count = count.saturating_sub(1);
        }
    }

    fn get_mut_unchecked<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.record_mut(entity)?
            .components
            .get_mut(&T::component_type_id())?
            .downcast_mut::<T>()
    }

    fn component_id_of(&self, value: &dyn Reflect) -> Result<ComponentTypeId, WorldError> {
        self.library
            .describe(value.value_type_id())
            .filter(|d| d.kind() == TypeKind::Component)
            .map(TypeDescriptor::component_type_id)
            .ok_or_else(|| WorldError::UnregisteredComponent(format!("{value:?}")))
    }

    fn ensure_alive(&self, entity: Entity) -> Result<(), WorldError> {
        if self.allocator.is_alive(entity) {
            Ok(())
        } else {
            Err(WorldError::EntityNotFound(entity))
        }
    }

    pub(crate) fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        self.records.get(entity.index() as usize)?.as_ref()
    }

    fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        self.records.get_mut(entity.index() as usize)?.as_mut()
    }

    pub(crate) fn slot_capacity(&self) -> u32 {
        self.allocator.capacity()
    }

    pub(crate) fn live_at(&self, index: u32) -> Option<Entity> {
        self.allocator.live_at(index)
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

fn replicated_fields(descriptor: &TypeDescriptor) -> Vec<&'static str> {
    descriptor
        .fields()
        .iter()
        .filter(|field| field.is_replicated())
        .map(|field| field.name())
        .collect()
}

/// Point handle fields of a copied value at the copies in `mapping`.
fn remap_handles(
    descriptor: &TypeDescriptor,
    value: &mut dyn Reflect,
    mapping: &HashMap<Entity, Entity>,
) {
    for field in descriptor.fields() {
        if !is_entity_container(field.value_type()) {
            continue;
        }
        let owning = field.is_owning_reference();
        if let Some(field_value) = value.field_mut(field.name()) {
            remap_entity_refs(field_value, &mut |e| match mapping.get(&e) {
                Some(copy) => *copy,
                None if owning => Entity::NULL,
                None => e,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::any::{Any, TypeId};
    use std::sync::Mutex;

    use engine_component::reflect;
    use engine_math::{Transform3D, Vec3};
    use engine_prefab::{ComponentPrototype, Prefab};
    use engine_reflect::{CopyError, CopyStrategy, TypeLibraryBuilder};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::router::priority;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    struct Position {
        x: i32,
        y: i32,
        z: i32,
    }

    reflect!(Position {
        x: i32 => [replicated],
        y: i32 => [replicated],
        z: i32 => [replicated],
    });

    impl Component for Position {
        fn type_name() -> &'static str {
            "test:Position"
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Health {
        current: f32,
        max: f32,
    }

    reflect!(Health {
        current: f32,
        max: f32,
    });

    impl Component for Health {
        fn type_name() -> &'static str {
            "test:Health"
        }
    }

    /// Only `current` is shared with other worlds.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Vitals {
        current: i32,
        max: i32,
    }

    reflect!(Vitals {
        current: i32 => [replicated],
        max: i32,
    });

    impl Component for Vitals {
        fn type_name() -> &'static str {
            "test:Vitals"
        }
    }

    /// Owns one other entity.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Holds {
        item: Option<Entity>,
    }

    reflect!(Holds {
        item: Option<Entity> => [owned],
    });

    impl Component for Holds {
        fn type_name() -> &'static str {
            "test:Holds"
        }
    }

    #[derive(Debug, Default)]
    struct Interact {
        consumed: bool,
    }

    reflect!(Interact { consumed: bool });

    impl Event for Interact {
        fn type_name() -> &'static str {
            "test:Interact"
        }

        fn is_consumable() -> bool {
            true
        }

        fn is_consumed(&self) -> bool {
            self.consumed
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn make_library() -> Arc<TypeLibrary> {
        let mut builder = TypeLibraryBuilder::default();
        builder
            .component::<Position>()
            .component::<Health>()
            .component::<Vitals>()
            .component::<Holds>()
            .component::<Transform3D>()
            .event::<Interact>();
        Arc::new(builder.build().unwrap())
    }

    fn make_world() -> World {
        World::with_library(make_library())
    }

    fn make_prefab_world(prefabs: Vec<Prefab>) -> World {
        let library = make_library();
        let store = PrefabStore::build(Arc::clone(&library), prefabs).unwrap();
        World::new(library, Arc::new(store))
    }

    fn make_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Record every lifecycle event as `"<kind> <entity> <component uri>"`.
    fn record_lifecycle(world: &mut World, log: &Log) {
        let uri = |world: &World, ty: ComponentTypeId| {
            world
                .library()
                .component(ty)
                .map_or("?", |d| d.uri())
                .to_string()
        };
        let l = Arc::clone(log);
        world
            .subscribe(Subscription::on::<OnAdded, _>(move |w, e, ev| {
                l.lock().unwrap().push(format!("added {e} {}", uri(&*w, ev.component)));
            }))
            .unwrap();
        let l = Arc::clone(log);
        world
            .subscribe(Subscription::on::<OnChanged, _>(move |w, e, ev| {
                l.lock().unwrap().push(format!("changed {e} {}", uri(&*w, ev.component)));
            }))
            .unwrap();
        let l = Arc::clone(log);
        world
            .subscribe(Subscription::on::<BeforeRemoved, _>(move |w, e, ev| {
                l.lock().unwrap().push(format!("removed {e} {}", uri(&*w, ev.component)));
            }))
            .unwrap();
    }

    #[test]
    fn test_position_scenario() {
        let mut world = make_world();
        let log = make_log();
        record_lifecycle(&mut world, &log);

        let e = world.create();
        let change = world.add_component(e, Position { x: 0, y: 0, z: 0 }).unwrap();
        assert_eq!(change, ComponentChange::Added);
        assert_eq!(entries(&log), vec![format!("added {e} test:Position")]);

        let change = world.add_component(e, Position { x: 1, y: 1, z: 1 }).unwrap();
        assert_eq!(change, ComponentChange::Changed);
        assert_eq!(entries(&log).len(), 2);
        assert_eq!(entries(&log)[1], format!("changed {e} test:Position"));
        assert_eq!(world.get::<Position>(e), Some(&Position { x: 1, y: 1, z: 1 }));

        world.destroy(e).unwrap();
        assert!(!world.has::<Position>(e));
        assert!(world.get::<Position>(e).is_none());
        assert!(!world.is_alive(e));
        assert!(matches!(
            world.add_component(e, Position::default()),
            Err(WorldError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_handles_are_never_reused() {
        let mut world = make_world();
        let mut seen = HashSet::new();
        let mut live = Vec::new();
        for round in 0..50 {
            let e = world.create();
            assert!(seen.insert(e), "handle {e} handed out twice");
            live.push(e);
            if round % 3 == 0 {
                let victim = live.remove(0);
                world.destroy(victim).unwrap();
            }
        }
        let unique: HashSet<_> = live.iter().copied().collect();
        assert_eq!(unique.len(), live.len());
        assert_eq!(world.entity_count(), live.len());
        assert!(!world.is_alive(Entity::NULL));
    }

    #[test]
    fn test_stale_handle_reports_not_found() {
        let mut world = make_world();
        let e = world.create();
        world.destroy(e).unwrap();
        let reused = world.create();
        assert_eq!(reused.index(), e.index());
        assert_ne!(reused, e);
        assert!(matches!(world.destroy(e), Err(WorldError::EntityNotFound(_))));
        assert!(matches!(
            world.remove_component::<Health>(e),
            Err(WorldError::EntityNotFound(_))
        ));
        assert!(matches!(
            world.send(e, Interact::default()),
            Err(WorldError::EntityNotFound(_))
        ));
        assert!(world.component_types(e).is_empty());
    }

    #[test]
    fn test_remove_raises_before_removed_with_final_value() {
        let mut world = make_world();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        world
            .subscribe(
                Subscription::on::<BeforeRemoved, _>(move |w, e, _| {
                    *s.lock().unwrap() = w.get::<Health>(e).cloned();
                })
                .requires::<Health>(),
            )
            .unwrap();
        let e = world.create();
        world
            .add_component(e, Health { current: 3.0, max: 9.0 })
            .unwrap();
        assert!(world.remove_component::<Health>(e).unwrap());
        assert_eq!(
            *seen.lock().unwrap(),
            Some(Health { current: 3.0, max: 9.0 })
        );
        assert!(!world.has::<Health>(e));
        assert!(!world.remove_component::<Health>(e).unwrap());
        assert_eq!(world.component_count::<Health>(), 0);
    }

    #[test]
    fn test_before_removed_handler_may_replace_component() {
        let mut world = make_world();
        world
            .subscribe(
                Subscription::on::<BeforeRemoved, _>(|w, e, _| {
                    w.add_component(e, Health { current: 1.0, max: 1.0 }).unwrap();
                })
                .requires::<Health>(),
            )
            .unwrap();
        let e = world.create();
        world
            .add_component(e, Health { current: 3.0, max: 9.0 })
            .unwrap();

        assert!(world.remove_component::<Health>(e).unwrap());
        assert_eq!(
            world.get::<Health>(e),
            Some(&Health { current: 1.0, max: 1.0 })
        );
        assert_eq!(world.component_count::<Health>(), 1);
    }

    #[test]
    fn test_lifecycle_handlers_only_hear_their_components() {
        let mut world = make_world();
        let log = make_log();
        let l = Arc::clone(&log);
        world
            .subscribe(
                Subscription::on::<OnAdded, _>(move |_, _, ev| {
                    l.lock().unwrap().push(format!("{:?}", ev.component));
                })
                .requires::<Health>(),
            )
            .unwrap();
        let e = world.create();
        world.add_component(e, Position::default()).unwrap();
        world.add_component(e, Health::default()).unwrap();
        // Position arrived first, while Health was absent; then Health itself.
        assert_eq!(
            entries(&log),
            vec![format!("{:?}", Health::component_type_id())]
        );
        world.add_component(e, Transform3D::IDENTITY).unwrap();
        assert_eq!(entries(&log).len(), 1);
    }

    #[test]
    fn test_modify_updates_in_place() {
        let mut world = make_world();
        let log = make_log();
        record_lifecycle(&mut world, &log);
        let e = world.create();
        world.add_component(e, Health { current: 5.0, max: 10.0 }).unwrap();
        let current = world
            .modify::<Health, _>(e, |h| {
                h.current += 2.0;
                h.current
            })
            .unwrap();
        assert_eq!(current, 7.0);
        assert_eq!(world.get::<Health>(e).map(|h| h.current), Some(7.0));
        assert_eq!(entries(&log).last().unwrap(), &format!("changed {e} test:Health"));
        assert!(matches!(
            world.modify::<Position, _>(e, |_| ()),
            Err(WorldError::MissingComponent { .. })
        ));
    }

    #[test]
    fn test_cascade_destroy_is_innermost_first() {
        let mut world = make_world();
        let log = make_log();
        let c = world.create();
        world.add_component(c, Health::default()).unwrap();
        let b = world.create();
        world.add_component(b, Holds { item: Some(c) }).unwrap();
        let a = world.create();
        world.add_component(a, Holds { item: Some(b) }).unwrap();
        record_lifecycle(&mut world, &log);

        world.destroy(a).unwrap();
        assert!(!world.is_alive(a) && !world.is_alive(b) && !world.is_alive(c));
        assert_eq!(
            entries(&log),
            vec![
                format!("removed {c} test:Health"),
                format!("removed {b} test:Holds"),
                format!("removed {a} test:Holds"),
            ]
        );
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.component_count::<Holds>(), 0);
    }

    #[test]
    fn test_cascade_destroy_survives_cycles() {
        let mut world = make_world();
        let a = world.create();
        let b = world.create();
        world.add_component(a, Holds { item: Some(b) }).unwrap();
        world.add_component(b, Holds { item: Some(a) }).unwrap();
        world.destroy(a).unwrap();
        assert!(!world.is_alive(a));
        assert!(!world.is_alive(b));
    }

    #[test]
    fn test_destroy_from_handler_is_safe() {
        let mut world = make_world();
        world
            .subscribe(Subscription::on::<BeforeRemoved, _>(|w, e, _| {
                assert!(w.destroy(e).is_ok());
            }))
            .unwrap();
        let e = world.create();
        world.add_component(e, Health::default()).unwrap();
        world.add_component(e, Position::default()).unwrap();
        world.destroy(e).unwrap();
        assert!(!world.is_alive(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_dispatch_order_and_consumption() {
        let mut world = make_world();
        let log = make_log();
        let l = Arc::clone(&log);
        world
            .subscribe(
                Subscription::on::<Interact, _>(move |_, _, _| l.lock().unwrap().push("h2".into()))
                    .priority(5),
            )
            .unwrap();
        let l = Arc::clone(&log);
        world
            .subscribe(
                Subscription::on::<Interact, _>(move |_, _, _| l.lock().unwrap().push("h1".into()))
                    .priority(10),
            )
            .unwrap();
        let e = world.create();
        let event = world.send(e, Interact::default()).unwrap();
        assert!(!event.consumed);
        assert_eq!(entries(&log), vec!["h1", "h2"]);

        log.lock().unwrap().clear();
        world
            .subscribe(
                Subscription::on::<Interact, _>(|_, _, ev| ev.consumed = true)
                    .priority(priority::CRITICAL),
            )
            .unwrap();
        let event = world.send(e, Interact::default()).unwrap();
        assert!(event.consumed);
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_required_components_filter_dispatch() {
        let mut world = make_world();
        let log = make_log();
        let l = Arc::clone(&log);
        world
            .subscribe(
                Subscription::on::<Interact, _>(move |_, e, _| {
                    l.lock().unwrap().push(e.to_string());
                })
                .requires::<Health>(),
            )
            .unwrap();
        let plain = world.create();
        let healthy = world.create();
        world.add_component(healthy, Health::default()).unwrap();
        world.send(plain, Interact::default()).unwrap();
        world.send(healthy, Interact::default()).unwrap();
        assert_eq!(entries(&log), vec![healthy.to_string()]);
    }

    #[test]
    fn test_nested_dispatch_is_depth_first() {
        let mut world = make_world();
        let log = make_log();
        let l = Arc::clone(&log);
        world
            .subscribe(
                Subscription::on::<OnAdded, _>(move |w, e, _| {
                    l.lock().unwrap().push("added:start".into());
                    w.send(e, Interact::default()).unwrap();
                    l.lock().unwrap().push("added:end".into());
                })
                .requires::<Health>(),
            )
            .unwrap();
        let l = Arc::clone(&log);
        world
            .subscribe(Subscription::on::<Interact, _>(move |w, _, _| {
                l.lock().unwrap().push("interact".into());
                // Subscribing mid-dispatch does not disturb the running dispatch.
                w.subscribe(Subscription::on::<Interact, _>(|_, _, _| {})).unwrap();
            }))
            .unwrap();
        let e = world.create();
        world.add_component(e, Health::default()).unwrap();
        assert_eq!(entries(&log), vec!["added:start", "interact", "added:end"]);
    }

    #[test]
    fn test_handler_skipped_after_required_component_removed() {
        let mut world = make_world();
        let log = make_log();
        world
            .subscribe(
                Subscription::on::<Interact, _>(|w, e, _| {
                    w.remove_component::<Health>(e).unwrap();
                })
                .priority(priority::HIGH),
            )
            .unwrap();
        let l = Arc::clone(&log);
        world
            .subscribe(
                Subscription::on::<Interact, _>(move |_, _, _| l.lock().unwrap().push("late".into()))
                    .requires::<Health>()
                    .priority(priority::LOW),
            )
            .unwrap();
        let e = world.create();
        world.add_component(e, Health::default()).unwrap();
        world.send(e, Interact::default()).unwrap();
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_query_tolerates_removal_of_yielded_entity() {
        let mut world = make_world();
        let mut expected = Vec::new();
        for i in 0..4 {
            let e = world.create();
            world
                .add_component(e, Health { current: i as f32, max: 10.0 })
                .unwrap();
            expected.push(e);
        }
        let mut cursor = world.query(ComponentSet::new().with::<Health>());
        let mut yielded = Vec::new();
        while let Some(e) = cursor.next(&world) {
            world.remove_component::<Health>(e).unwrap();
            let spawned = world.create();
            world.add_component(spawned, Health::default()).unwrap();
            yielded.push(e);
        }
        assert_eq!(yielded, expected);
        // The restarted cursor sees the entities created during the first pass.
        cursor.restart(&world);
        let mut count = 0;
        while cursor.next(&world).is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn test_iter_with() {
        let mut world = make_world();
        let a = world.create();
        let b = world.create();
        world.add_component(a, Position { x: 1, y: 2, z: 3 }).unwrap();
        world.add_component(b, Health::default()).unwrap();
        let found: Vec<_> = world.iter_with::<Position>().collect();
        assert_eq!(found, vec![(a, &Position { x: 1, y: 2, z: 3 })]);
    }

    #[test]
    fn test_create_with_rejects_unregistered_values() {
        let mut world = make_world();
        let log = make_log();
        record_lifecycle(&mut world, &log);
        let e = world
            .create_with(vec![
                Box::new(Position::default()) as Box<dyn Reflect>,
                Box::new(Health::default()),
            ])
            .unwrap();
        assert_eq!(world.component_types(e).len(), 2);
        assert_eq!(entries(&log).len(), 2);

        #[derive(Debug, Default)]
        struct Stray;
        reflect!(Stray {});

        let before = world.entity_count();
        let result = world.create_with(vec![
            Box::new(Position::default()) as Box<dyn Reflect>,
            Box::new(Stray),
        ]);
        assert!(matches!(result, Err(WorldError::UnregisteredComponent(_))));
        assert_eq!(world.entity_count(), before);
        assert_eq!(entries(&log).len(), 2);
    }

    #[test]
    fn test_create_from_prefab_graph() {
        let mut world = make_prefab_world(vec![
            Prefab::new("test:creature")
                .with(Health { current: 10.0, max: 10.0 })
                .with(Transform3D::from_position(Vec3::Y)),
            Prefab::new("test:goblin")
                .with_parent("test:creature")
                .with_prototype(ComponentPrototype::partial(
                    Health::component_type_id(),
                    Box::new(Health { current: 0.0, max: 40.0 }),
                    vec!["max"],
                ))
                .with_child("test:dagger"),
            Prefab::new("test:dagger").with(Position { x: 0, y: 1, z: 0 }),
        ]);
        let log = make_log();
        record_lifecycle(&mut world, &log);

        let goblin = world.create_from("test:goblin").unwrap();
        assert_eq!(world.get::<Health>(goblin), Some(&Health { current: 10.0, max: 40.0 }));
        let children = world.get::<Children>(goblin).unwrap().entities.clone();
        assert_eq!(children.len(), 1);
        let dagger = children[0];
        assert_eq!(world.get::<Parent>(dagger).map(|p| p.entity), Some(goblin));
        assert!(world.has::<Position>(dagger));
        // health + transform + children on the goblin; position + parent on the dagger.
        assert_eq!(entries(&log).len(), 5);

        // Two instances never share component state.
        let other = world.create_from("test:goblin").unwrap();
        world.modify::<Health, _>(other, |h| h.current = 1.0).unwrap();
        assert_eq!(world.get::<Health>(goblin).map(|h| h.current), Some(10.0));

        world.destroy(goblin).unwrap();
        assert!(!world.is_alive(dagger));
    }

    #[test]
    fn test_create_from_unknown_prefab_creates_nothing() {
        let mut world = make_prefab_world(Vec::new());
        assert!(matches!(
            world.create_from("test:nothing"),
            Err(WorldError::Prefab(_))
        ));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_create_from_rolls_back_when_a_child_fails_to_copy() {
        struct Refuse;

        impl CopyStrategy for Refuse {
            fn copy(&self, _value: &dyn Any) -> Result<Box<dyn Any>, CopyError> {
                Err(CopyError::NoStrategy("test:Vitals"))
            }
        }

        let mut builder = TypeLibraryBuilder::default();
        builder.component::<Health>().component::<Vitals>();
        builder
            .copy_strategies_mut()
            .register_strategy(TypeId::of::<Vitals>(), Arc::new(Refuse));
        let library = Arc::new(builder.build().unwrap());
        let store = PrefabStore::build(
            Arc::clone(&library),
            vec![
                Prefab::new("p:root")
                    .with(Health { current: 1.0, max: 1.0 })
                    .with_child("p:ok")
                    .with_child("p:bad"),
                Prefab::new("p:ok").with(Health { current: 2.0, max: 2.0 }),
                Prefab::new("p:bad").with(Vitals { current: 3, max: 3 }),
            ],
        )
        .unwrap();
        let mut world = World::new(library, Arc::new(store));
        let log = make_log();
        record_lifecycle(&mut world, &log);

        assert!(world.create_from("p:root").is_err());
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.component_count::<Health>(), 0);
        assert_eq!(world.component_count::<Children>(), 0);
        assert!(entries(&log).is_empty());

        // The failed call leaves nothing behind for later ones.
        assert!(world.create_from("p:ok").is_ok());
        assert_eq!(world.component_count::<Health>(), 1);
    }

    #[test]
    fn test_copy_entity_remaps_owned_references() {
        let mut world = make_world();
        let item = world.create();
        world.add_component(item, Health { current: 1.0, max: 2.0 }).unwrap();
        let owner = world.create();
        world.add_component(owner, Holds { item: Some(item) }).unwrap();

        let copy = world.copy_entity(owner).unwrap();
        let copied_item = world.get::<Holds>(copy).and_then(|h| h.item).unwrap();
        assert_ne!(copied_item, item);
        assert_eq!(world.get::<Health>(copied_item), world.get::<Health>(item));
        assert_eq!(world.entity_count(), 4);

        world.destroy(owner).unwrap();
        assert!(world.is_alive(copy) && world.is_alive(copied_item));
    }

    #[test]
    fn test_replication_records_roundtrip() {
        let mut world = make_world();
        let e = world.create();
        world.add_component(e, Position { x: 4, y: 5, z: 6 }).unwrap();
        world.add_component(e, Health::default()).unwrap();
        let records = world.replicated_records(e).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].component_type, Position::component_type_id());

        let mut mirror = make_world();
        let m = mirror.create();
        let record = ComponentRecord { entity: m, ..records[0].clone() };
        assert_eq!(mirror.apply_record(&record).unwrap(), ComponentChange::Added);
        assert_eq!(mirror.get::<Position>(m), Some(&Position { x: 4, y: 5, z: 6 }));
    }

    #[test]
    fn test_replication_leaves_local_fields_alone() {
        let mut authority = make_world();
        let a = authority.create();
        authority.add_component(a, Vitals { current: 5, max: 10 }).unwrap();
        let records = authority.replicated_records(a).unwrap();
        assert_eq!(records.len(), 1);

        let mut client = make_world();
        let c = client.create();
        client.add_component(c, Vitals { current: 0, max: 99 }).unwrap();
        let record = ComponentRecord { entity: c, ..records[0].clone() };
        assert_eq!(client.apply_record(&record).unwrap(), ComponentChange::Changed);
        assert_eq!(client.get::<Vitals>(c), Some(&Vitals { current: 5, max: 99 }));

        // Without a local value the unreplicated fields start blank.
        let fresh = client.create();
        let record = ComponentRecord { entity: fresh, ..records[0].clone() };
        assert_eq!(client.apply_record(&record).unwrap(), ComponentChange::Added);
        assert_eq!(client.get::<Vitals>(fresh), Some(&Vitals { current: 5, max: 0 }));

        let dead = client.create();
        client.destroy(dead).unwrap();
        let record = ComponentRecord { entity: dead, ..records[0].clone() };
        assert!(matches!(
            client.apply_record(&record),
            Err(WorldError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_subscribe_validates_types() {
        #[derive(Debug, Default)]
        struct Unknown;
        reflect!(Unknown {});
        impl Event for Unknown {
            fn type_name() -> &'static str {
                "test:Unknown"
            }
        }

        let mut world = make_world();
        assert!(matches!(
            world.subscribe(Subscription::on::<Unknown, _>(|_, _, _| {})),
            Err(WorldError::UnregisteredEvent(_))
        ));
        assert!(world.subscribe(Subscription::on::<Interact, _>(|_, _, _| {})).is_ok());
        assert_eq!(world.unsubscribe_owner("nobody"), 0);
    }

    #[test]
    fn test_counts() {
        let mut world = make_world();
        let a = world.create();
        let b = world.create();
        world.add_component(a, Health::default()).unwrap();
        world.add_component(b, Health::default()).unwrap();
        world.add_component(b, Health::default()).unwrap();
        assert_eq!(world.component_count::<Health>(), 2);
        world.destroy(a).unwrap();
        assert_eq!(world.component_count::<Health>(), 1);
        assert_eq!(world.entities(), vec![b]);
    }
}
