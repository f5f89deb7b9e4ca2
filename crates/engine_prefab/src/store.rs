//! Prefab Store.
//!
//! Holds every prefab of one module environment. The store is validated as
//! a whole when it is built: parents and child prefabs must exist, the
//! inheritance/child graph must be acyclic, and every prototype must name a
//! registered component whose Rust type matches the stored value. After
//! that, [`PrefabStore::flatten`] cannot fail on structure.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use engine_component::{ComponentTypeId, Reflect};
use engine_reflect::{CopyError, TypeLibrary};
use tracing::debug;

use crate::error::PrefabError;
use crate::prefab::Prefab;

/// A prefab with its parent chain applied.
///
/// Component values are fresh copies owned by the caller.
#[derive(Debug)]
pub struct FlatPrefab {
    pub name: String,
    /// Components in first-declaration order along the chain, root first.
    pub components: Vec<(ComponentTypeId, Box<dyn Reflect>)>,
    /// Child prefabs, inherited ones first.
    pub children: Vec<String>,
}

/// All prefabs of one environment, keyed by name.
#[derive(Debug)]
pub struct PrefabStore {
    library: Arc<TypeLibrary>,
    prefabs: HashMap<String, Arc<Prefab>>,
    order: Vec<String>,
}

impl PrefabStore {
    /// An empty store.
    #[must_use]
    pub fn empty(library: Arc<TypeLibrary>) -> Self {
        Self {
            library,
            prefabs: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Validate `prefabs` against `library` and build the store.
    pub fn build(
        library: Arc<TypeLibrary>,
        prefabs: impl IntoIterator<Item = Prefab>,
    ) -> Result<Self, PrefabError> {
        let mut store = Self::empty(library);
        for prefab in prefabs {
            let name = prefab.name().to_string();
            if store.prefabs.contains_key(&name) {
                return Err(PrefabError::DuplicatePrefab(name));
            }
            store.order.push(name.clone());
            store.prefabs.insert(name, Arc::new(prefab));
        }

        for prefab in store.prefabs.values() {
            store.validate(prefab)?;
        }
        store.check_cycles()?;
        debug!(prefabs = store.order.len(), "prefab store built");
        Ok(store)
    }

    fn validate(&self, prefab: &Prefab) -> Result<(), PrefabError> {
        if let Some(parent) = prefab.parent() {
            if !self.prefabs.contains_key(parent) {
                return Err(PrefabError::UnknownParent {
                    prefab: prefab.name().to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        if let Some(child) = prefab
            .children()
            .iter()
            .find(|c| !self.prefabs.contains_key(c.as_str()))
        {
            return Err(PrefabError::UnknownChild {
                prefab: prefab.name().to_string(),
                child: child.clone(),
            });
        }
        for prototype in prefab.components() {
            let descriptor = self
                .library
                .component(prototype.component())
                .filter(|d| d.rust_type() == prototype.value().value_type_id())
                .ok_or_else(|| PrefabError::UnknownComponent {
                    prefab: prefab.name().to_string(),
                    component: format!("{:?}", prototype.component()),
                })?;
            if let Some(field) = prototype
                .fields()
                .iter()
                .find(|f| descriptor.field(f).is_none())
            {
                return Err(PrefabError::UnknownField {
                    prefab: prefab.name().to_string(),
                    component: descriptor.uri().to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Depth-first search over parent and child edges.
    fn check_cycles(&self) -> Result<(), PrefabError> {
        let mut done: HashSet<&str> = HashSet::new();
        for name in &self.order {
            let mut path = Vec::new();
            self.visit(name, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), PrefabError> {
        if done.contains(name) {
            return Ok(());
        }
        if path.contains(&name) {
            return Err(PrefabError::Cycle(name.to_string()));
        }
        let prefab = self.get(name)?;
        path.push(name);
        for next in prefab
            .parent()
            .into_iter()
            .chain(prefab.children().iter().map(String::as_str))
        {
            self.visit(next, path, done)?;
        }
        path.pop();
        done.insert(name);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&Arc<Prefab>, PrefabError> {
        self.prefabs
            .get(name)
            .ok_or_else(|| PrefabError::UnknownPrefab(name.to_string()))
    }

    /// Look a prefab up by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<Prefab>, PrefabError> {
        self.get(name).map(Arc::clone)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.prefabs.contains_key(name)
    }

    /// Prefabs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Prefab>> {
        self.order.iter().filter_map(|name| self.prefabs.get(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn library(&self) -> &Arc<TypeLibrary> {
        &self.library
    }

    /// Apply the parent chain of `name`.
    ///
    /// Parents come first. When a descendant declares a component the chain
    /// already holds, its declared fields overwrite the inherited value in
    /// place, so the component keeps its first position. Every call returns
    /// new copies, and the result depends only on the store's contents.
    pub fn flatten(&self, name: &str) -> Result<FlatPrefab, PrefabError> {
        let mut chain = Vec::new();
        let mut current = Some(self.get(name)?);
        while let Some(prefab) = current {
            chain.push(prefab);
            current = prefab.parent().map(|p| self.get(p)).transpose()?;
        }

        let mut components: Vec<(ComponentTypeId, Box<dyn Reflect>)> = Vec::new();
        let mut children = Vec::new();
        for prefab in chain.into_iter().rev() {
            for prototype in prefab.components() {
                let descriptor = self.library.component(prototype.component()).ok_or_else(|| {
                    PrefabError::UnknownComponent {
                        prefab: prefab.name().to_string(),
                        component: format!("{:?}", prototype.component()),
                    }
                })?;
                match components
                    .iter_mut()
                    .find(|(id, _)| *id == prototype.component())
                {
                    Some((_, inherited)) => {
                        for &field in prototype.fields() {
                            let source = prototype.value().field(field).ok_or(CopyError::Field {
                                type_name: descriptor.rust_name(),
                                field,
                            })?;
                            let copied = descriptor.copy_field(field, source)?;
                            inherited.set_field(field, copied).map_err(|_| CopyError::Field {
                                type_name: descriptor.rust_name(),
                                field,
                            })?;
                        }
                    }
                    None => {
                        let copy = descriptor.copy_value(prototype.value())?;
                        components.push((prototype.component(), copy));
                    }
                }
            }
            children.extend(prefab.children().iter().cloned());
        }

        Ok(FlatPrefab {
            name: name.to_string(),
            components,
            children,
        })
    }
}
