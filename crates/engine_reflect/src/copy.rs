//! Copy-strategy library.
//!
//! A [`CopyStrategy`] produces an independent copy of a value of one static
//! type. The [`CopyStrategyLibrary`] maps types to strategies with this
//! lookup order:
//!
//! 1. an exactly registered strategy ([`CopyStrategyLibrary::register_clone`],
//!    [`CopyStrategyLibrary::register_fn`], ...);
//! 2. a field-wise strategy synthesized from an aggregate's declared fields
//!    ([`CopyStrategyLibrary::register_aggregate`]), recursively;
//! 3. failure ([`CopyError::NoStrategy`]).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use engine_component::{ComponentTypeId, Entity, FieldInfo, Reflect, Typed};

use crate::error::CopyError;

/// Produces an independent copy of a type-erased value.
pub trait CopyStrategy: Send + Sync {
    /// Copy `value`. Fails with [`CopyError::TypeMismatch`] if `value` is
    /// not of the type this strategy handles.
    fn copy(&self, value: &dyn Any) -> Result<Box<dyn Any>, CopyError>;
}

/// Copies values through their `Clone` impl.
pub struct CloneStrategy<T>(PhantomData<fn() -> T>);

impl<T> CloneStrategy<T> {
    /// Create the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for CloneStrategy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> CopyStrategy for CloneStrategy<T> {
    fn copy(&self, value: &dyn Any) -> Result<Box<dyn Any>, CopyError> {
        value
            .downcast_ref::<T>()
            .map(|v| Box::new(v.clone()) as Box<dyn Any>)
            .ok_or(CopyError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }
}

/// Copies values with a user-supplied function.
pub struct FnStrategy<T> {
    f: fn(&T) -> T,
}

impl<T> FnStrategy<T> {
    /// Wrap a copy function.
    #[must_use]
    pub fn new(f: fn(&T) -> T) -> Self {
        Self { f }
    }
}

impl<T: 'static> CopyStrategy for FnStrategy<T> {
    fn copy(&self, value: &dyn Any) -> Result<Box<dyn Any>, CopyError> {
        let value = value
            .downcast_ref::<T>()
            .ok_or(CopyError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })?;
        Ok(Box::new((self.f)(value)))
    }
}

/// Field-wise copy of an aggregate: a blank instance with every declared
/// field copied in through that field's own strategy.
struct FieldwiseStrategy {
    type_name: &'static str,
    blank: fn() -> Box<dyn Reflect>,
    as_reflect: fn(&dyn Any) -> Option<&dyn Reflect>,
    fields: Vec<(&'static str, Arc<dyn CopyStrategy>)>,
}

impl CopyStrategy for FieldwiseStrategy {
    fn copy(&self, value: &dyn Any) -> Result<Box<dyn Any>, CopyError> {
        let source = (self.as_reflect)(value).ok_or(CopyError::TypeMismatch {
            expected: self.type_name,
        })?;
        let mut copy = (self.blank)();
        for (name, strategy) in &self.fields {
            let name = *name;
            let field_error = || CopyError::Field {
                type_name: self.type_name,
                field: name,
            };
            let original = source.field(name).ok_or_else(field_error)?;
            let copied = strategy.copy(original)?;
            copy.set_field(name, copied).map_err(|_| field_error())?;
        }
        Ok(copy.into_any())
    }
}

fn blank<T: Typed>() -> Box<dyn Reflect> {
    Box::new(T::blank())
}

fn as_reflect<T: Reflect>(value: &dyn Any) -> Option<&dyn Reflect> {
    value.downcast_ref::<T>().map(|v| v as &dyn Reflect)
}

#[derive(Clone, Copy)]
struct Aggregate {
    type_name: &'static str,
    fields: fn() -> Vec<FieldInfo>,
    blank: fn() -> Box<dyn Reflect>,
    as_reflect: fn(&dyn Any) -> Option<&dyn Reflect>,
}

/// Registry of copy strategies keyed by value type.
#[derive(Clone, Default)]
pub struct CopyStrategyLibrary {
    strategies: HashMap<TypeId, Arc<dyn CopyStrategy>>,
    aggregates: HashMap<TypeId, Aggregate>,
}

macro_rules! register_clones {
    ($library:ident; $( $ty:ty ),* $(,)?) => {
        $( $library.register_clone::<$ty>(); )*
    };
}

impl CopyStrategyLibrary {
    /// An empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A library with strategies for primitives, strings, engine handles and
    /// common geometry types.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut library = Self::new();
        register_clones!(library;
            bool, char,
            u8, u16, u32, u64, usize,
            i8, i16, i32, i64, isize,
            f32, f64,
            String, Option<String>, Vec<String>,
            Entity, Option<Entity>, Vec<Entity>,
            ComponentTypeId,
            glam::Vec2, glam::Vec3, glam::Vec4,
            glam::IVec2, glam::IVec3,
            glam::Quat, glam::Mat3, glam::Mat4,
        );
        library
    }

    /// Register an exact strategy for `type_id`, replacing any previous one.
    pub fn register_strategy(&mut self, type_id: TypeId, strategy: Arc<dyn CopyStrategy>) {
        self.strategies.insert(type_id, strategy);
    }

    /// Register `T`'s `Clone` impl as its strategy.
    pub fn register_clone<T: Clone + 'static>(&mut self) {
        self.register_strategy(TypeId::of::<T>(), Arc::new(CloneStrategy::<T>::new()));
    }

    /// Register a copy function for `T`.
    pub fn register_fn<T: 'static>(&mut self, f: fn(&T) -> T) {
        self.register_strategy(TypeId::of::<T>(), Arc::new(FnStrategy::new(f)));
    }

    /// Make `T` copyable field by field.
    pub fn register_aggregate<T: Typed>(&mut self) {
        self.aggregates.insert(
            TypeId::of::<T>(),
            Aggregate {
                type_name: std::any::type_name::<T>(),
                fields: T::fields,
                blank: blank::<T>,
                as_reflect: as_reflect::<T>,
            },
        );
    }

    /// The exactly registered strategy for `type_id`, if any.
    #[must_use]
    pub fn exact(&self, type_id: TypeId) -> Option<Arc<dyn CopyStrategy>> {
        self.strategies.get(&type_id).cloned()
    }

    /// Returns `true` if a strategy can be resolved for `type_id`.
    #[must_use]
    pub fn can_copy(&self, type_id: TypeId) -> bool {
        self.resolve(type_id, "").is_ok()
    }

    /// Resolve the strategy for `type_id`. `type_name` is only used in the
    /// error when resolution fails.
    pub fn resolve(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Arc<dyn CopyStrategy>, CopyError> {
        self.resolve_inner(type_id, type_name, &mut Vec::new())
    }

    fn resolve_inner(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        visiting: &mut Vec<TypeId>,
    ) -> Result<Arc<dyn CopyStrategy>, CopyError> {
        if let Some(strategy) = self.strategies.get(&type_id) {
            return Ok(Arc::clone(strategy));
        }
        let aggregate = self
            .aggregates
            .get(&type_id)
            .ok_or(CopyError::NoStrategy(type_name))?;
        if visiting.contains(&type_id) {
            return Err(CopyError::Recursive(aggregate.type_name));
        }
        visiting.push(type_id);
        let mut fields = Vec::new();
        for field in (aggregate.fields)() {
            let strategy = self.resolve_inner(field.type_id, field.type_name, visiting)?;
            fields.push((field.name, strategy));
        }
        visiting.pop();
        Ok(Arc::new(FieldwiseStrategy {
            type_name: aggregate.type_name,
            blank: aggregate.blank,
            as_reflect: aggregate.as_reflect,
            fields,
        }))
    }

    /// Copy a value of a statically known type.
    pub fn copy_of<T: 'static>(&self, value: &T) -> Result<T, CopyError> {
        let strategy = self.resolve(TypeId::of::<T>(), std::any::type_name::<T>())?;
        strategy
            .copy(value)?
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| CopyError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }
}

impl fmt::Debug for CopyStrategyLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let aggregates: Vec<_> = self.aggregates.values().map(|a| a.type_name).collect();
        f.debug_struct("CopyStrategyLibrary")
            .field("strategies", &self.strategies.len())
            .field("aggregates", &aggregates)
            .finish()
    }
}
