//! Module sources.

use engine_prefab::Prefab;
use engine_reflect::{TypeLibrary, TypeLibraryBuilder};

use crate::system::System;

/// A unit of content loaded into a module environment: component and event
/// types, prefabs, and systems.
///
/// Every hook is called again on each environment build, so a module must
/// produce fresh systems each time [`Module::systems`] is called.
pub trait Module {
    fn name(&self) -> &str;

    fn register_types(&self, types: &mut TypeLibraryBuilder) {
        let _ = types;
    }

    /// Prefabs contributed by this module. `library` already holds the types
    /// of every module in the environment.
    fn load_prefabs(&self, library: &TypeLibrary) -> anyhow::Result<Vec<Prefab>> {
        let _ = library;
        Ok(Vec::new())
    }

    /// Named systems, in the order they should be initialised.
    fn systems(&self) -> Vec<(String, Box<dyn System>)> {
        Vec::new()
    }
}
