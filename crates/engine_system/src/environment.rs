//! Module environments.
//!
//! A [`ModuleEnvironment`] is everything derived from one set of modules:
//! the type library, the prefab store, the world and the system registry.
//! Nothing is carried over between environments. The
//! [`EnvironmentManager`] builds a replacement completely before it
//! touches the active environment, so a broken module set never takes down
//! a running one.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use engine_ecs::World;
use engine_prefab::PrefabStore;
use engine_reflect::TypeLibrary;

use crate::error::EnvironmentError;
use crate::module::Module;
use crate::registry::SystemRegistry;

pub struct ModuleEnvironment {
    modules: Vec<String>,
    world: World,
    systems: SystemRegistry,
    active: bool,
}

impl ModuleEnvironment {
    /// Build type library, prefab store, world and system registry from
    /// `modules`, in that order. Systems are registered but not initialised.
    pub fn build(modules: &[Arc<dyn Module>]) -> Result<Self, EnvironmentError> {
        let mut seen = HashSet::new();
        for module in modules {
            if !seen.insert(module.name()) {
                return Err(EnvironmentError::DuplicateModule(module.name().to_string()));
            }
        }

        let mut types = TypeLibrary::builder();
        for module in modules {
            module.register_types(&mut types);
        }
        let library = Arc::new(types.build()?);

        let mut prefabs = Vec::new();
        for module in modules {
            let loaded = module
                .load_prefabs(&library)
                .map_err(|source| EnvironmentError::Module {
                    module: module.name().to_string(),
                    source,
                })?;
            prefabs.extend(loaded);
        }
        let prefabs = Arc::new(PrefabStore::build(Arc::clone(&library), prefabs)?);

        let world = World::new(Arc::clone(&library), Arc::clone(&prefabs));

        let mut systems = SystemRegistry::new();
        for module in modules {
            for (name, system) in module.systems() {
                systems.register_boxed(system, name)?;
            }
        }

        let modules: Vec<String> = modules.iter().map(|m| m.name().to_string()).collect();
        info!(
            modules = ?modules,
            components = library.components().count(),
            events = library.events().count(),
            prefabs = prefabs.len(),
            systems = systems.len(),
            "module environment built"
        );

        Ok(Self {
            modules,
            world,
            systems,
            active: false,
        })
    }

    /// Initialise every system. Does nothing if already active.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        let running = self.systems.initialise_all(&mut self.world);
        info!(
            running,
            systems = self.systems.len(),
            "module environment activated"
        );
    }

    /// Run one simulation step. Returns `false` when the environment is not
    /// active.
    pub fn tick(&mut self, delta: f32) -> bool {
        if !self.active {
            return false;
        }
        self.systems.update_all(&mut self.world, delta);
        true
    }

    /// Shut every system down. The world is left as is until the
    /// environment is dropped. Dropping an active environment tears it down
    /// first.
    pub fn teardown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.systems.shutdown_all(&mut self.world);
        info!(modules = ?self.modules, "module environment torn down");
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub fn library(&self) -> &Arc<TypeLibrary> {
        self.world.library()
    }

    #[must_use]
    pub fn prefabs(&self) -> &Arc<PrefabStore> {
        self.world.prefabs()
    }

    #[must_use]
    pub fn systems(&self) -> &SystemRegistry {
        &self.systems
    }
}

impl fmt::Debug for ModuleEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEnvironment")
            .field("modules", &self.modules)
            .field("active", &self.active)
            .field("systems", &self.systems)
            .field("entities", &self.world.entity_count())
            .finish()
    }
}

impl Drop for ModuleEnvironment {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Owns the active module environment and replaces it on request.
#[derive(Debug, Default)]
pub struct EnvironmentManager {
    active: Option<ModuleEnvironment>,
    switches: u64,
}

impl EnvironmentManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active environment with one built from `modules`.
    ///
    /// On a build error the active environment keeps running and the error
    /// is returned. On success the old environment is torn down before the
    /// new one is activated.
    pub fn switch_to(&mut self, modules: &[Arc<dyn Module>]) -> Result<(), EnvironmentError> {
        let mut next = match ModuleEnvironment::build(modules) {
            Ok(environment) => environment,
            Err(err) => {
                error!(error = %err, "environment build failed, keeping the active environment");
                return Err(err);
            }
        };
        if let Some(mut previous) = self.active.take() {
            previous.teardown();
        }
        next.activate();
        self.active = Some(next);
        self.switches += 1;
        Ok(())
    }

    /// Advance the active environment by one step. Returns `false` when no
    /// environment is active.
    pub fn tick(&mut self, delta: f32) -> bool {
        self.active.as_mut().is_some_and(|env| env.tick(delta))
    }

    /// Tear down and drop the active environment.
    pub fn shutdown(&mut self) {
        if let Some(mut environment) = self.active.take() {
            environment.teardown();
        }
    }

    #[must_use]
    pub fn active(&self) -> Option<&ModuleEnvironment> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ModuleEnvironment> {
        self.active.as_mut()
    }

    /// Number of successful switches so far.
    #[must_use]
    pub fn switches(&self) -> u64 {
        self.switches
    }
}

impl Drop for EnvironmentManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
