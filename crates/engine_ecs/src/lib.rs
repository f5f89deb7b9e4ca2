//! # engine_ecs
//!
//! The runtime half of the entity/component/event core.
//!
//! - [`World`]: the entity store, with generational entities, typed component
//!   storage, prefab instantiation, cascade destroy, live queries and
//!   replication records.
//! - [`EventRouter`] / [`Subscription`]: synchronous, prioritised event
//!   dispatch filtered by the components an entity currently holds.

pub mod error;
pub mod query;
pub mod router;
pub mod world;

pub use error::WorldError;
pub use query::QueryCursor;
pub use router::{EventRouter, Handler, HandlerId, Subscription, priority};
pub use world::{ComponentChange, World};
