//! Event Router.
//!
//! Subscriptions are grouped per event type and kept sorted by descending
//! priority; ties keep registration order. A dispatch takes a snapshot of
//! the matching handlers, so handlers may subscribe, unsubscribe and raise
//! nested events without disturbing the dispatch that invoked them.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use engine_component::{Component, ComponentSet, ComponentTypeId, Entity, Event, EventTypeId};

use crate::world::World;

/// Named priority levels. Higher runs first.
pub mod priority {
    pub const CRITICAL: i32 = 200;
    pub const HIGH: i32 = 150;
    pub const NORMAL: i32 = 100;
    pub const LOW: i32 = 50;
    pub const TRIVIAL: i32 = 25;
}

/// Type-erased handler. The `&mut dyn Any` is the event value.
pub type Handler = Arc<dyn Fn(&mut World, Entity, &mut dyn Any) + Send + Sync>;

/// Identifies one registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// A handler together with the conditions under which it runs.
pub struct Subscription {
    event: EventTypeId,
    event_name: &'static str,
    required: ComponentSet,
    priority: i32,
    owner: Option<String>,
    handler: Handler,
}

impl Subscription {
    /// Handle events of type `E` at [`priority::NORMAL`], for any entity.
    pub fn on<E, F>(handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut World, Entity, &mut E) + Send + Sync + 'static,
    {
        Self {
            event: E::event_type_id(),
            event_name: E::type_name(),
            required: ComponentSet::new(),
            priority: priority::NORMAL,
            owner: None,
            handler: Arc::new(move |world: &mut World, entity: Entity, event: &mut dyn Any| {
                if let Some(event) = event.downcast_mut::<E>() {
                    handler(world, entity, event);
                }
            }),
        }
    }

    /// Only run for entities that hold component `T`.
    #[must_use]
    pub fn requires<T: Component>(mut self) -> Self {
        self.required.insert(T::component_type_id());
        self
    }

    /// Only run for entities that hold every type in `required`.
    #[must_use]
    pub fn requiring(mut self, required: ComponentSet) -> Self {
        for ty in required.iter() {
            self.required.insert(ty);
        }
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Tag the subscription with the system that registered it.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    #[must_use]
    pub fn event_type(&self) -> EventTypeId {
        self.event
    }

    #[must_use]
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    #[must_use]
    pub fn required(&self) -> &ComponentSet {
        &self.required
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event_name)
            .field("required", &self.required)
            .field("priority", &self.priority)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

pub(crate) struct Entry {
    id: HandlerId,
    required: ComponentSet,
    priority: i32,
    owner: Option<String>,
    handler: Handler,
}

impl Entry {
    /// Whether the entry should see an event reporting on `subject` for an
    /// entity whose components satisfy `has`.
    fn accepts(&self, subject: Option<ComponentTypeId>, has: &impl Fn(ComponentTypeId) -> bool) -> bool {
        if let Some(subject) = subject {
            if !self.required.is_empty() && !self.required.contains(subject) {
                return false;
            }
        }
        self.required.is_satisfied_by(has)
    }

    pub(crate) fn required(&self) -> &ComponentSet {
        &self.required
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// Dispatch table: event type to prioritised subscriptions.
#[derive(Default)]
pub struct EventRouter {
    entries: HashMap<EventTypeId, Vec<Arc<Entry>>>,
    next_id: u64,
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. It joins after existing ones of equal priority.
    pub fn subscribe(&mut self, subscription: Subscription) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        let list = self.entries.entry(subscription.event).or_default();
        let pos = list.partition_point(|e| e.priority >= subscription.priority);
        list.insert(
            pos,
            Arc::new(Entry {
                id,
                required: subscription.required,
                priority: subscription.priority,
                owner: subscription.owner,
                handler: subscription.handler,
            }),
        );
        id
    }

    /// Remove one subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        for list in self.entries.values_mut() {
            if let Some(pos) = list.iter().position(|e| e.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every subscription tagged with `owner`. Returns how many.
    pub fn unsubscribe_owner(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        for list in self.entries.values_mut() {
            let before = list.len();
            list.retain(|e| e.owner.as_deref() != Some(owner));
            removed += before - list.len();
        }
        removed
    }

    /// Number of subscriptions for `event`.
    #[must_use]
    pub fn handler_count(&self, event: EventTypeId) -> usize {
        self.entries.get(&event).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entries that match, in invocation order.
    pub(crate) fn matching(
        &self,
        event: EventTypeId,
        subject: Option<ComponentTypeId>,
        has: impl Fn(ComponentTypeId) -> bool,
    ) -> Vec<Arc<Entry>> {
        self.entries
            .get(&event)
            .map(|list| {
                list.iter()
                    .filter(|e| e.accepts(subject, &has))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("subscriptions", &self.len())
            .finish()
    }
}
