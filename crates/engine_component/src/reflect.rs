//! Runtime field access for components and events.
//!
//! [`Reflect`] exposes a value's fields by name as `dyn Any`; [`Typed`]
//! lists the declared fields with their markers. Both are generated by the
//! [`reflect!`](crate::reflect!) macro from a single field list, so a type
//! never needs hand-written field plumbing.

use std::any::{Any, TypeId};
use std::fmt;

/// Static description of one declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name as written in the struct.
    pub name: &'static str,
    /// `TypeId` of the field's value type.
    pub type_id: TypeId,
    /// Rust name of the field's value type, for diagnostics.
    pub type_name: &'static str,
    /// Sent from the authority to clients.
    pub replicated: bool,
    /// Holds handles whose entities are destroyed together with the owner.
    pub owning_reference: bool,
}

impl FieldInfo {
    /// Describe a field of value type `T`.
    #[must_use]
    pub fn of<T: 'static>(name: &'static str) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            replicated: false,
            owning_reference: false,
        }
    }

    /// Mark the field as replicated.
    #[must_use]
    pub const fn replicated(mut self) -> Self {
        self.replicated = true;
        self
    }

    /// Mark the field as an owning reference.
    #[must_use]
    pub const fn owned(mut self) -> Self {
        self.owning_reference = true;
        self
    }
}

/// Name-based field access on a type-erased value.
pub trait Reflect: Any + Send + Sync + fmt::Debug {
    /// Upcast to `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Upcast to `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Upcast a boxed value to `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Borrow a field by name.
    fn field(&self, name: &str) -> Option<&dyn Any>;

    /// Mutably borrow a field by name.
    fn field_mut(&mut self, name: &str) -> Option<&mut dyn Any>;

    /// Overwrite a field. Hands the value back if the name is unknown or
    /// the value has the wrong type.
    fn set_field(&mut self, name: &str, value: Box<dyn Any>) -> Result<(), Box<dyn Any>>;
}

impl dyn Reflect {
    /// Downcast to a concrete type.
    #[must_use]
    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably downcast to a concrete type.
    #[must_use]
    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// `TypeId` of the concrete value behind the trait object.
    #[must_use]
    pub fn value_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }
}

/// Static shape of a reflectable type.
pub trait Typed: Reflect + Sized {
    /// The declared fields, in declaration order.
    fn fields() -> Vec<FieldInfo>;

    /// A blank instance that field-wise copies are written into.
    fn blank() -> Self;
}

/// Implement [`Reflect`] and [`Typed`] for a struct from its field list.
///
/// Fields may carry markers in brackets: `replicated` and `owned`. The
/// struct must implement `Default` (used for blank instances) and `Debug`.
///
/// ```rust
/// use engine_component::{reflect, Entity};
///
/// #[derive(Debug, Default)]
/// struct Mount {
///     rider: Entity,
///     saddle: Option<Entity>,
///     speed: f32,
/// }
///
/// reflect!(Mount {
///     rider: Entity,
///     saddle: Option<Entity> => [owned],
///     speed: f32 => [replicated],
/// });
/// ```
#[macro_export]
macro_rules! reflect {
    ($ty:ident { $( $field:ident : $fty:ty $( => [ $( $flag:ident ),* $(,)? ] )? ),* $(,)? }) => {
        impl $crate::Reflect for $ty {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }

            #[allow(unused_variables)]
            fn field(&self, name: &str) -> ::std::option::Option<&dyn ::std::any::Any> {
                match name {
                    $( stringify!($field) => ::std::option::Option::Some(&self.$field), )*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn field_mut(&mut self, name: &str) -> ::std::option::Option<&mut dyn ::std::any::Any> {
                match name {
                    $( stringify!($field) => ::std::option::Option::Some(&mut self.$field), )*
                    _ => ::std::option::Option::None,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: ::std::boxed::Box<dyn ::std::any::Any>,
            ) -> ::std::result::Result<(), ::std::boxed::Box<dyn ::std::any::Any>> {
                match name {
                    $( stringify!($field) => {
                        self.$field = *value.downcast::<$fty>()?;
                        ::std::result::Result::Ok(())
                    } )*
                    _ => ::std::result::Result::Err(value),
                }
            }
        }

        impl $crate::Typed for $ty {
            fn fields() -> ::std::vec::Vec<$crate::FieldInfo> {
                ::std::vec![
                    $( $crate::FieldInfo::of::<$fty>(stringify!($field)) $( $( .$flag() )* )? ),*
                ]
            }

            fn blank() -> Self {
                ::std::default::Default::default()
            }
        }
    };
}
