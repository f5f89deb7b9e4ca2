//! # engine_system
//!
//! System lifecycle and module environments.
//!
//! A [`Module`] supplies component and event types, prefabs and systems.
//! [`ModuleEnvironment::build`] turns a module set into a type library, a
//! prefab store, a world and a [`SystemRegistry`]. The
//! [`EnvironmentManager`] owns the active environment, drives it once per
//! tick and swaps it out on request.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use engine_ecs::World;
//! use engine_system::{EnvironmentManager, Module, System};
//!
//! struct Gravity;
//!
//! impl System for Gravity {
//!     fn update(&mut self, _world: &mut World, _delta: f32) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct Physics;
//!
//! impl Module for Physics {
//!     fn name(&self) -> &str {
//!         "physics"
//!     }
//!
//!     fn systems(&self) -> Vec<(String, Box<dyn System>)> {
//!         vec![("physics:gravity".to_string(), Box::new(Gravity))]
//!     }
//! }
//!
//! let mut manager = EnvironmentManager::new();
//! let modules: Vec<Arc<dyn Module>> = vec![Arc::new(Physics)];
//! manager.switch_to(&modules).unwrap();
//! manager.tick(1.0 / 60.0);
//! ```

pub mod environment;
pub mod error;
pub mod module;
pub mod registry;
pub mod system;

pub use environment::{EnvironmentManager, ModuleEnvironment};
pub use error::{EnvironmentError, SystemError};
pub use module::Module;
pub use registry::SystemRegistry;
pub use system::{System, SystemState};
