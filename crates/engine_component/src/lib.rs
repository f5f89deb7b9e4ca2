//! # engine_component
//!
//! The "C" in ECS. Defines what a component and an event are, how entities
//! are identified, and how values expose their fields to the metadata layer.
//!
//! This crate provides:
//!
//! - [`Component`] and [`Event`] traits, named by `module:TypeName` URIs.
//! - [`Entity`]: generational `(slot, generation)` handles.
//! - [`EntityAllocator`]: slot recycling with stale-handle detection.
//! - [`Reflect`] / [`Typed`] and the [`reflect!`] macro: field access and
//!   field metadata without per-type hand-written code.
//! - [`ComponentSet`]: required-component sets for queries and routing.
//! - Built-in lifecycle events and hierarchy components.

pub mod builtin;
pub mod component;
pub mod entity;
pub mod query;
pub mod reflect;

pub use builtin::{BeforeRemoved, Children, OnAdded, OnChanged, Parent};
pub use component::{Component, ComponentRecord, ComponentTypeId, Event, EventTypeId, fnv1a};
pub use entity::{Entity, EntityAllocator, entity_refs, is_entity_container, remap_entity_refs};
pub use query::ComponentSet;
pub use reflect::{FieldInfo, Reflect, Typed};
