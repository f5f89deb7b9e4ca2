//! # engine_prefab
//!
//! Prefabs are named, immutable entity templates. A prefab declares
//! component prototypes, may inherit from a parent prefab (overriding it
//! field by field) and may declare child prefabs that are instantiated as
//! owned child entities.
//!
//! Prefabs are authored as JSON ([`load_prefabs`]) or in code
//! ([`Prefab::new`]) and collected into a [`PrefabStore`] per module
//! environment.

pub mod error;
pub mod loader;
pub mod prefab;
pub mod store;

pub use error::PrefabError;
pub use loader::{PrefabDefinition, load_prefabs, parse_definitions};
pub use prefab::{ComponentPrototype, Prefab};
pub use store::{FlatPrefab, PrefabStore};
