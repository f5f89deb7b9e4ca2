//! Types every module environment provides.
//!
//! The entity store raises the lifecycle events below whenever a component
//! set changes, and prefab instantiation links composite objects with
//! [`Children`] and [`Parent`].

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentTypeId, Event};
use crate::entity::Entity;
use crate::reflect;

/// Raised after a component type that the entity did not have is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OnAdded {
    /// The component type that was added.
    pub component: ComponentTypeId,
}

reflect!(OnAdded {
    component: ComponentTypeId,
});

impl Event for OnAdded {
    fn type_name() -> &'static str {
        "engine:OnAdded"
    }

    fn subject_component(&self) -> Option<ComponentTypeId> {
        Some(self.component)
    }
}

/// Raised after an existing component was replaced or modified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OnChanged {
    /// The component type that changed.
    pub component: ComponentTypeId,
}

reflect!(OnChanged {
    component: ComponentTypeId,
});

impl Event for OnChanged {
    fn type_name() -> &'static str {
        "engine:OnChanged"
    }

    fn subject_component(&self) -> Option<ComponentTypeId> {
        Some(self.component)
    }
}

/// Raised while a component is still attached, just before it is removed.
///
/// Handlers can read the component's final values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeforeRemoved {
    /// The component type about to be removed.
    pub component: ComponentTypeId,
}

reflect!(BeforeRemoved {
    component: ComponentTypeId,
});

impl Event for BeforeRemoved {
    fn type_name() -> &'static str {
        "engine:BeforeRemoved"
    }

    fn subject_component(&self) -> Option<ComponentTypeId> {
        Some(self.component)
    }
}

/// Child entities owned by this entity; destroyed along with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Children {
    /// Owned child handles, in declaration order.
    pub entities: Vec<Entity>,
}

reflect!(Children {
    entities: Vec<Entity> => [owned, replicated],
});

impl Component for Children {
    fn type_name() -> &'static str {
        "engine:Children"
    }
}

/// Back-reference from a child to the entity that owns it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    /// The owning entity.
    pub entity: Entity,
}

reflect!(Parent {
    entity: Entity => [replicated],
});

impl Component for Parent {
    fn type_name() -> &'static str {
        "engine:Parent"
    }
}
