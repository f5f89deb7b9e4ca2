//! Type Metadata Registry.
//!
//! A [`TypeLibrary`] is built once per module environment from the
//! component, event and aggregate types the modules declare. Building fails
//! fast: every field of every registered type must have a resolvable copy
//! strategy, every URI must be well formed and unique, and owning-reference
//! markers may only sit on fields that hold entity handles. The finished
//! library is immutable; a new environment builds a new one.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use engine_component::{
    BeforeRemoved, Children, Component, ComponentTypeId, Event, EventTypeId, FieldInfo, OnAdded,
    OnChanged, Parent, Reflect, Typed, is_entity_container,
};
use tracing::debug;

use crate::codec::ComponentCodec;
use crate::copy::{CopyStrategy, CopyStrategyLibrary};
use crate::error::{CopyError, MetadataError};

/// What a registered type is used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Attached to entities.
    Component,
    /// Dispatched through the event router.
    Event,
}

/// One field of a described type.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: &'static str,
    value_type: TypeId,
    value_type_name: &'static str,
    replicated: bool,
    owning_reference: bool,
    copy: Arc<dyn CopyStrategy>,
}

impl FieldDescriptor {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    #[must_use]
    pub fn value_type_name(&self) -> &'static str {
        self.value_type_name
    }

    #[must_use]
    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    #[must_use]
    pub fn is_owning_reference(&self) -> bool {
        self.owning_reference
    }

    /// The strategy used to copy this field's value.
    #[must_use]
    pub fn copy_strategy(&self) -> &Arc<dyn CopyStrategy> {
        &self.copy
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type_name)
            .field("replicated", &self.replicated)
            .field("owning_reference", &self.owning_reference)
            .finish()
    }
}

/// Everything the engine knows about one component or event type.
pub struct TypeDescriptor {
    uri: &'static str,
    kind: TypeKind,
    rust_type: TypeId,
    rust_name: &'static str,
    fields: Vec<FieldDescriptor>,
    copy: Arc<dyn CopyStrategy>,
    blank: fn() -> Box<dyn Reflect>,
    from_any: fn(Box<dyn Any>) -> Option<Box<dyn Reflect>>,
    codec: Option<ComponentCodec>,
}

impl TypeDescriptor {
    /// The full `module:TypeName` URI.
    #[must_use]
    pub fn uri(&self) -> &'static str {
        self.uri
    }

    /// The module part of the URI.
    #[must_use]
    pub fn module(&self) -> &'static str {
        split_uri(self.uri).map_or("", |(module, _)| module)
    }

    /// The type-name part of the URI.
    #[must_use]
    pub fn name(&self) -> &'static str {
        split_uri(self.uri).map_or(self.uri, |(_, name)| name)
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// `TypeId` of the Rust type behind this descriptor.
    #[must_use]
    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    #[must_use]
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    #[must_use]
    pub fn component_type_id(&self) -> ComponentTypeId {
        ComponentTypeId::from_name(self.uri)
    }

    #[must_use]
    pub fn event_type_id(&self) -> EventTypeId {
        EventTypeId::from_name(self.uri)
    }

    /// Declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns `true` if any field is replicated.
    #[must_use]
    pub fn is_replicated(&self) -> bool {
        self.fields.iter().any(|f| f.replicated)
    }

    /// Returns `true` if any field is an owning reference.
    #[must_use]
    pub fn owns_references(&self) -> bool {
        self.fields.iter().any(|f| f.owning_reference)
    }

    /// Fields holding owned entity handles.
    pub fn owning_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.owning_reference)
    }

    /// Deep-copy a value of this type.
    pub fn copy_value(&self, value: &dyn Reflect) -> Result<Box<dyn Reflect>, CopyError> {
        let copied = self.copy.copy(value.as_any())?;
        (self.from_any)(copied).ok_or(CopyError::TypeMismatch {
            expected: self.rust_name,
        })
    }

    /// Copy one field value with that field's strategy.
    pub fn copy_field(&self, name: &str, value: &dyn Any) -> Result<Box<dyn Any>, CopyError> {
        let field = self.field(name).ok_or(CopyError::NoStrategy(self.rust_name))?;
        field.copy.copy(value)
    }

    /// A blank instance of this type.
    #[must_use]
    pub fn blank(&self) -> Box<dyn Reflect> {
        (self.blank)()
    }

    /// Serialisation hooks. Present for components only.
    #[must_use]
    pub fn codec(&self) -> Option<&ComponentCodec> {
        self.codec.as_ref()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("uri", &self.uri)
            .field("kind", &self.kind)
            .field("rust_name", &self.rust_name)
            .field("fields", &self.fields)
            .finish()
    }
}

fn split_uri(uri: &str) -> Option<(&str, &str)> {
    let (module, name) = uri.split_once(':')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    (valid(module) && valid(name)).then_some((module, name))
}

fn blank_of<T: Typed>() -> Box<dyn Reflect> {
    Box::new(T::blank())
}

fn from_any<T: Typed>(value: Box<dyn Any>) -> Option<Box<dyn Reflect>> {
    value.downcast::<T>().ok().map(|v| v as Box<dyn Reflect>)
}

struct Registration {
    uri: &'static str,
    kind: TypeKind,
    rust_type: TypeId,
    rust_name: &'static str,
    fields: Vec<FieldInfo>,
    blank: fn() -> Box<dyn Reflect>,
    from_any: fn(Box<dyn Any>) -> Option<Box<dyn Reflect>>,
    codec: Option<ComponentCodec>,
}

impl Registration {
    fn component<T: Component>() -> Self {
        Self {
            uri: T::type_name(),
            kind: TypeKind::Component,
            rust_type: TypeId::of::<T>(),
            rust_name: std::any::type_name::<T>(),
            fields: T::fields(),
            blank: blank_of::<T>,
            from_any: from_any::<T>,
            codec: Some(ComponentCodec::of::<T>()),
        }
    }

    fn event<E: Event>() -> Self {
        Self {
            uri: E::type_name(),
            kind: TypeKind::Event,
            rust_type: TypeId::of::<E>(),
            rust_name: std::any::type_name::<E>(),
            fields: E::fields(),
            blank: blank_of::<E>,
            from_any: from_any::<E>,
            codec: None,
        }
    }
}

/// Collects type registrations and validates them into a [`TypeLibrary`].
pub struct TypeLibraryBuilder {
    copy: CopyStrategyLibrary,
    registrations: Vec<Registration>,
}

impl TypeLibraryBuilder {
    /// Start a builder over `copy`. The engine core types are registered
    /// up front.
    #[must_use]
    pub fn new(copy: CopyStrategyLibrary) -> Self {
        let mut builder = Self {
            copy,
            registrations: Vec::new(),
        };
        builder
            .event::<OnAdded>()
            .event::<OnChanged>()
            .event::<BeforeRemoved>()
            .component::<Children>()
            .component::<Parent>();
        builder
    }

    /// Register a component type.
    pub fn component<T: Component>(&mut self) -> &mut Self {
        self.copy.register_aggregate::<T>();
        self.registrations.push(Registration::component::<T>());
        self
    }

    /// Register an event type.
    pub fn event<E: Event>(&mut self) -> &mut Self {
        self.copy.register_aggregate::<E>();
        self.registrations.push(Registration::event::<E>());
        self
    }

    /// Register a nested value type to be copied field by field.
    pub fn aggregate<T: Typed>(&mut self) -> &mut Self {
        self.copy.register_aggregate::<T>();
        self
    }

    /// The copy strategies the build will resolve against.
    pub fn copy_strategies_mut(&mut self) -> &mut CopyStrategyLibrary {
        &mut self.copy
    }

    /// Validate every registration and produce the library.
    pub fn build(self) -> Result<TypeLibrary, MetadataError> {
        let mut library = TypeLibrary {
            descriptors: Vec::with_capacity(self.registrations.len()),
            components: HashMap::new(),
            events: HashMap::new(),
            by_rust_type: HashMap::new(),
            copy: CopyStrategyLibrary::new(),
        };
        let mut uris: HashMap<String, &'static str> = HashMap::new();

        for reg in self.registrations {
            if split_uri(reg.uri).is_none() {
                return Err(MetadataError::InvalidUri(reg.uri.to_string()));
            }
            if uris.insert(reg.uri.to_ascii_lowercase(), reg.uri).is_some()
                || library.by_rust_type.contains_key(&reg.rust_type)
            {
                return Err(MetadataError::DuplicateType(reg.uri.to_string()));
            }

            let mut fields = Vec::with_capacity(reg.fields.len());
            for info in &reg.fields {
                if info.owning_reference && !is_entity_container(info.type_id) {
                    return Err(MetadataError::InvalidOwningReference {
                        type_uri: reg.uri.to_string(),
                        field: info.name,
                        value_type: info.type_name,
                    });
                }
                let copy = self
                    .copy
                    .resolve(info.type_id, info.type_name)
                    .map_err(|source| MetadataError::NoCopyStrategy {
                        type_uri: reg.uri.to_string(),
                        field: info.name,
                        value_type: info.type_name,
                        source,
                    })?;
                fields.push(FieldDescriptor {
                    name: info.name,
                    value_type: info.type_id,
                    value_type_name: info.type_name,
                    replicated: info.replicated,
                    owning_reference: info.owning_reference,
                    copy,
                });
            }
            let copy = self
                .copy
                .resolve(reg.rust_type, reg.rust_name)
                .map_err(|source| MetadataError::NoCopyStrategy {
                    type_uri: reg.uri.to_string(),
                    field: "",
                    value_type: reg.rust_name,
                    source,
                })?;

            let index = library.descriptors.len();
            match reg.kind {
                TypeKind::Component => {
                    let id = ComponentTypeId::from_name(reg.uri);
                    if let Some(&other) = library.components.get(&id) {
                        let other: &TypeDescriptor = &library.descriptors[other];
                        return Err(MetadataError::IdCollision(
                            other.uri.to_string(),
                            reg.uri.to_string(),
                        ));
                    }
                    library.components.insert(id, index);
                }
                TypeKind::Event => {
                    let id = EventTypeId::from_name(reg.uri);
                    if let Some(&other) = library.events.get(&id) {
                        let other: &TypeDescriptor = &library.descriptors[other];
                        return Err(MetadataError::IdCollision(
                            other.uri.to_string(),
                            reg.uri.to_string(),
                        ));
                    }
                    library.events.insert(id, index);
                }
            }
            library.by_rust_type.insert(reg.rust_type, index);
            library.descriptors.push(TypeDescriptor {
                uri: reg.uri,
                kind: reg.kind,
                rust_type: reg.rust_type,
                rust_name: reg.rust_name,
                fields,
                copy,
                blank: reg.blank,
                from_any: reg.from_any,
                codec: reg.codec,
            });
        }

        library.copy = self.copy;
        debug!(
            components = library.components.len(),
            events = library.events.len(),
            "type library built"
        );
        Ok(library)
    }
}

impl Default for TypeLibraryBuilder {
    fn default() -> Self {
        Self::new(CopyStrategyLibrary::with_defaults())
    }
}

/// Immutable metadata for every type of one module environment.
pub struct TypeLibrary {
    descriptors: Vec<TypeDescriptor>,
    components: HashMap<ComponentTypeId, usize>,
    events: HashMap<EventTypeId, usize>,
    by_rust_type: HashMap<TypeId, usize>,
    copy: CopyStrategyLibrary,
}

impl TypeLibrary {
    /// A builder preloaded with the default copy strategies.
    #[must_use]
    pub fn builder() -> TypeLibraryBuilder {
        TypeLibraryBuilder::default()
    }

    #[must_use]
    pub fn component(&self, id: ComponentTypeId) -> Option<&TypeDescriptor> {
        self.components.get(&id).map(|&i| &self.descriptors[i])
    }

    #[must_use]
    pub fn component_of<T: Component>(&self) -> Option<&TypeDescriptor> {
        self.component(T::component_type_id())
    }

    #[must_use]
    pub fn event(&self, id: EventTypeId) -> Option<&TypeDescriptor> {
        self.events.get(&id).map(|&i| &self.descriptors[i])
    }

    #[must_use]
    pub fn event_of<E: Event>(&self) -> Option<&TypeDescriptor> {
        self.event(E::event_type_id())
    }

    /// Look a descriptor up by Rust type.
    #[must_use]
    pub fn describe(&self, type_id: TypeId) -> Option<&TypeDescriptor> {
        self.by_rust_type.get(&type_id).map(|&i| &self.descriptors[i])
    }

    #[must_use]
    pub fn contains_component(&self, id: ComponentTypeId) -> bool {
        self.components.contains_key(&id)
    }

    #[must_use]
    pub fn contains_event(&self, id: EventTypeId) -> bool {
        self.events.contains_key(&id)
    }

    /// Resolve a component by URI or by bare type name.
    ///
    /// Matching is case-insensitive. A bare name (`"health"`) must match
    /// exactly one registered component.
    pub fn resolve_component(&self, name: &str) -> Result<&TypeDescriptor, MetadataError> {
        let qualified = name.contains(':');
        let candidates: Vec<&TypeDescriptor> = self
            .components()
            .filter(|d| {
                if qualified {
                    d.uri.eq_ignore_ascii_case(name)
                } else {
                    d.name().eq_ignore_ascii_case(name)
                }
            })
            .collect();
        match candidates.as_slice() {
            [] => Err(MetadataError::UnknownType(name.to_string())),
            [only] => Ok(only),
            many => Err(MetadataError::AmbiguousName {
                name: name.to_string(),
                candidates: many.iter().map(|d| d.uri.to_string()).collect(),
            }),
        }
    }

    /// Component descriptors, in registration order.
    pub fn components(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.kind == TypeKind::Component)
    }

    /// Event descriptors, in registration order.
    pub fn events(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.iter().filter(|d| d.kind == TypeKind::Event)
    }

    #[must_use]
    pub fn copy_strategies(&self) -> &CopyStrategyLibrary {
        &self.copy
    }

    /// Copy a value of a statically known type.
    pub fn copy_of<T: 'static>(&self, value: &T) -> Result<T, CopyError> {
        self.copy.copy_of(value)
    }
}

impl fmt::Debug for TypeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uris: Vec<_> = self.descriptors.iter().map(|d| d.uri).collect();
        f.debug_struct("TypeLibrary").field("types", &uris).finish()
    }
}
