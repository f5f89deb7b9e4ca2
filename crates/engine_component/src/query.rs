//! Required-component sets.
//!
//! A [`ComponentSet`] names the component types an entity must hold to match
//! a query or to be routed an event by a subscription. Sets are kept sorted
//! and deduplicated so two sets built in different orders compare equal.

use crate::component::{Component, ComponentTypeId};

/// A sorted, duplicate-free set of component types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ComponentSet {
    types: Vec<ComponentTypeId>,
}

impl ComponentSet {
    /// The empty set. Every entity satisfies it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add component type `T`.
    #[must_use]
    pub fn with<T: Component>(self) -> Self {
        self.with_type(T::component_type_id())
    }

    /// Add a component type by id.
    #[must_use]
    pub fn with_type(mut self, type_id: ComponentTypeId) -> Self {
        self.insert(type_id);
        self
    }

    /// Insert a component type in place. Returns `false` if already present.
    pub fn insert(&mut self, type_id: ComponentTypeId) -> bool {
        match self.types.binary_search(&type_id) {
            Ok(_) => false,
            Err(pos) => {
                self.types.insert(pos, type_id);
                true
            }
        }
    }

    /// Returns `true` if `type_id` is in the set.
    #[must_use]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.types.binary_search(&type_id).is_ok()
    }

    /// Returns `true` if every type in this set satisfies `has`.
    pub fn is_satisfied_by(&self, mut has: impl FnMut(ComponentTypeId) -> bool) -> bool {
        self.types.iter().all(|ty| has(*ty))
    }

    /// Returns `true` if every type in this set is also in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &ComponentSet) -> bool {
        self.is_satisfied_by(|ty| other.contains(ty))
    }

    /// Iterate the types in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.types.iter().copied()
    }

    /// Number of types in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` for the empty set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl FromIterator<ComponentTypeId> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        let mut set = Self::new();
        for ty in iter {
            set.insert(ty);
        }
        set
    }
}
