//! Core [`Component`] and [`Event`] traits and their type identifiers.
//!
//! Every component and event type is named by a URI of the form
//! `module:TypeName`. Type identifiers are derived from that URI with the
//! FNV-1a 64-bit hash, so the same name always yields the same id on the
//! authority and on every client.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::reflect::Typed;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Hash a type URI with FNV-1a 64-bit.
///
/// ```text
/// hash = 0xcbf29ce484222325
/// for each byte in name.as_bytes():
///     hash = hash XOR byte
///     hash = hash * 0x00000100000001b3
/// ```
#[must_use]
pub const fn fnv1a(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// A unique identifier for a component type, derived from its URI.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// Compute the id for a component URI such as `"core:Health"`.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a(name))
    }

    /// The id of component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

/// A unique identifier for an event type, derived from its URI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTypeId(pub u64);

impl EventTypeId {
    /// Compute the id for an event URI such as `"core:Damage"`.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a(name))
    }

    /// The id of event type `E`.
    #[must_use]
    pub fn of<E: Event>() -> Self {
        Self::from_name(E::type_name())
    }
}

/// The core component trait.
///
/// Components are plain data: they carry state and no behaviour. Field
/// access and field metadata come from [`Typed`], normally generated with
/// the [`reflect!`](crate::reflect!) macro. Components must be serialisable
/// so the persistence and replication layers can encode them and so prefab
/// files can describe them.
///
/// # Examples
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use engine_component::{reflect, Component};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// reflect!(Health {
///     current: f32 => [replicated],
///     max: f32,
/// });
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "core:Health" }
/// }
/// ```
pub trait Component: Typed + Serialize + for<'de> Deserialize<'de> {
    /// The `module:TypeName` URI of this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }
}

/// A transient, typed payload dispatched against one entity.
///
/// Consumable events return `true` from [`Event::is_consumable`] and report
/// their consumed flag through [`Event::is_consumed`]; once a handler
/// consumes one, the remaining handlers of that dispatch are skipped.
pub trait Event: Typed {
    /// The `module:TypeName` URI of this event type.
    fn type_name() -> &'static str;

    /// Returns the [`EventTypeId`] for this event.
    fn event_type_id() -> EventTypeId {
        EventTypeId::from_name(Self::type_name())
    }

    /// Whether handlers may stop propagation of this event type.
    fn is_consumable() -> bool {
        false
    }

    /// Whether a handler has consumed this event.
    fn is_consumed(&self) -> bool {
        false
    }

    /// The component type this event reports on, for lifecycle events.
    ///
    /// A subscription with a non-empty required set only receives such an
    /// event when the reported type is part of that set.
    fn subject_component(&self) -> Option<ComponentTypeId> {
        None
    }
}

/// A record pairing an [`Entity`] with encoded component data.
///
/// Produced for the persistence and replication collaborators, which decide
/// how records travel; the payload is MessagePack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// The entity this component belongs to.
    pub entity: Entity,
    /// The component's type.
    pub component_type: ComponentTypeId,
    /// MessagePack-encoded component bytes.
    pub data: Vec<u8>,
}
