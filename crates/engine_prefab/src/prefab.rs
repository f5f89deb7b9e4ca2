//! Prefab definitions.

use engine_component::{Component, ComponentTypeId, Reflect};

/// One component value declared by a prefab.
///
/// `fields` lists the fields this prototype sets. When the prefab inherits
/// the component from its parent, only those fields override the inherited
/// value; the rest keep the parent's values.
#[derive(Debug)]
pub struct ComponentPrototype {
    component: ComponentTypeId,
    value: Box<dyn Reflect>,
    fields: Vec<&'static str>,
}

impl ComponentPrototype {
    /// A prototype that sets every field of `value`.
    #[must_use]
    pub fn full<T: Component>(value: T) -> Self {
        Self {
            component: T::component_type_id(),
            value: Box::new(value),
            fields: T::fields().iter().map(|f| f.name).collect(),
        }
    }

    /// A prototype that only sets `fields`.
    #[must_use]
    pub fn partial(
        component: ComponentTypeId,
        value: Box<dyn Reflect>,
        fields: Vec<&'static str>,
    ) -> Self {
        Self {
            component,
            value,
            fields,
        }
    }

    #[must_use]
    pub fn component(&self) -> ComponentTypeId {
        self.component
    }

    #[must_use]
    pub fn value(&self) -> &dyn Reflect {
        self.value.as_ref()
    }

    #[must_use]
    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }
}

/// A named, immutable entity template.
#[derive(Debug)]
pub struct Prefab {
    name: String,
    parent: Option<String>,
    components: Vec<ComponentPrototype>,
    children: Vec<String>,
}

impl Prefab {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            components: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Inherit components and children from `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declare a full component value. A later declaration of the same
    /// component type replaces the earlier one.
    #[must_use]
    pub fn with<T: Component>(self, value: T) -> Self {
        self.with_prototype(ComponentPrototype::full(value))
    }

    #[must_use]
    pub fn with_prototype(mut self, prototype: ComponentPrototype) -> Self {
        self.components
            .retain(|p| p.component != prototype.component);
        self.components.push(prototype);
        self
    }

    /// Instantiate prefab `child` as an owned child entity.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<String>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[must_use]
    pub fn components(&self) -> &[ComponentPrototype] {
        &self.components
    }

    #[must_use]
    pub fn children(&self) -> &[String] {
        &self.children
    }
}
