//! System Registry.
//!
//! Owns the systems of one module environment and drives their lifecycle:
//! initialisation in registration order, per-tick updates, and shutdown in
//! reverse order. A failing system never stops the others. It is logged,
//! marked [`SystemState::Failed`], and its subscriptions are withdrawn.

use std::fmt;

use tracing::{debug, error, info, warn};

use engine_ecs::World;

use crate::error::SystemError;
use crate::system::{System, SystemState};

struct Slot {
    name: String,
    state: SystemState,
    /// Whether `initialise` succeeded, so `shutdown` is owed.
    started: bool,
    system: Box<dyn System>,
}

#[derive(Default)]
pub struct SystemRegistry {
    slots: Vec<Slot>,
}

impl SystemRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `system` under `name`. Names are unique within a registry.
    pub fn register<S: System + 'static>(
        &mut self,
        system: S,
        name: impl Into<String>,
    ) -> Result<(), SystemError> {
        self.register_boxed(Box::new(system), name)
    }

    pub fn register_boxed(
        &mut self,
        system: Box<dyn System>,
        name: impl Into<String>,
    ) -> Result<(), SystemError> {
        let name = name.into();
        if self.slots.iter().any(|s| s.name == name) {
            return Err(SystemError::DuplicateSystem(name));
        }
        debug!(system = name.as_str(), "system registered");
        self.slots.push(Slot {
            name,
            state: SystemState::Registered,
            started: false,
            system,
        });
        Ok(())
    }

    /// Subscribe and initialise every registered system, in registration
    /// order. Returns the number of systems now running.
    pub fn initialise_all(&mut self, world: &mut World) -> usize {
        for slot in &mut self.slots {
            if slot.state != SystemState::Registered {
                continue;
            }
            match start(slot, world) {
                Ok(()) => {
                    slot.state = SystemState::Running;
                    info!(system = slot.name.as_str(), "system initialised");
                }
                Err(err) => {
                    world.unsubscribe_owner(&slot.name);
                    slot.state = SystemState::Failed;
                    error!(system = slot.name.as_str(), error = %err, "system failed to initialise");
                }
            }
        }
        self.running()
    }

    /// Run the update hook of every running system, in registration order.
    pub fn update_all(&mut self, world: &mut World, delta: f32) {
        for slot in &mut self.slots {
            if slot.state != SystemState::Running {
                continue;
            }
            if let Err(err) = slot.system.update(world, delta) {
                world.unsubscribe_owner(&slot.name);
                slot.state = SystemState::Failed;
                error!(system = slot.name.as_str(), error = %err, "system update failed, disabling");
            }
        }
    }

    /// Shut every system down in reverse registration order. Shutdown
    /// failures are logged and do not stop the remaining systems.
    pub fn shutdown_all(&mut self, world: &mut World) {
        for slot in self.slots.iter_mut().rev() {
            if slot.state == SystemState::Shutdown {
                continue;
            }
            if slot.started {
                if let Err(err) = slot.system.shutdown(world) {
                    warn!(system = slot.name.as_str(), error = %err, "system shutdown failed");
                }
            }
            world.unsubscribe_owner(&slot.name);
            slot.started = false;
            slot.state = SystemState::Shutdown;
            info!(system = slot.name.as_str(), "system shut down");
        }
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<SystemState> {
        self.slots.iter().find(|s| s.name == name).map(|s| s.state)
    }

    /// Like [`SystemRegistry::state`] but an unknown name is an error.
    pub fn expect_state(&self, name: &str) -> Result<SystemState, SystemError> {
        self.state(name)
            .ok_or_else(|| SystemError::UnknownSystem(name.to_string()))
    }

    /// System names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SystemState::Running)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn start(slot: &mut Slot, world: &mut World) -> anyhow::Result<()> {
    for subscription in slot.system.subscriptions() {
        world.subscribe(subscription.owner(slot.name.as_str()))?;
    }
    slot.system.initialise(world)?;
    slot.started = true;
    Ok(())
}

impl fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|s| (&s.name, s.state)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::bail;
    use engine_component::{Event, reflect};
    use engine_ecs::Subscription;
    use engine_reflect::TypeLibrary;

    use super::*;

    #[derive(Debug, Default)]
    struct Ping;

    reflect!(Ping {});

    impl Event for Ping {
        fn type_name() -> &'static str {
            "test:Ping"
        }
    }

    #[derive(Debug, Default)]
    struct Unregistered;

    reflect!(Unregistered {});

    impl Event for Unregistered {
        fn type_name() -> &'static str {
            "test:Unregistered"
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct Recording {
        label: &'static str,
        log: Log,
        fail_init: bool,
        fail_update: bool,
        fail_shutdown: bool,
        subscribe_unregistered: bool,
    }

    impl Recording {
        fn record(&self, what: &str) {
            self.log.lock().unwrap().push(format!("{what}:{}", self.label));
        }
    }

    impl System for Recording {
        fn subscriptions(&self) -> Vec<Subscription> {
            let mut subscriptions = vec![Subscription::on::<Ping, _>(|_, _, _| {})];
            if self.subscribe_unregistered {
                subscriptions.push(Subscription::on::<Unregistered, _>(|_, _, _| {}));
            }
            subscriptions
        }

        fn initialise(&mut self, _world: &mut World) -> anyhow::Result<()> {
            self.record("init");
            if self.fail_init {
                bail!("init refused");
            }
            Ok(())
        }

        fn update(&mut self, _world: &mut World, _delta: f32) -> anyhow::Result<()> {
            self.record("update");
            if self.fail_update {
                bail!("update refused");
            }
            Ok(())
        }

        fn shutdown(&mut self, _world: &mut World) -> anyhow::Result<()> {
            self.record("shutdown");
            if self.fail_shutdown {
                bail!("shutdown refused");
            }
            Ok(())
        }
    }

    fn make_world() -> World {
        let mut builder = TypeLibrary::builder();
        builder.event::<Ping>();
        World::with_library(Arc::new(builder.build().unwrap()))
    }

    fn make_system(label: &'static str, log: &Log) -> Recording {
        Recording {
            label,
            log: Arc::clone(log),
            ..Recording::default()
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_lifecycle_order() {
        let log = Log::default();
        let mut world = make_world();
        let mut registry = SystemRegistry::new();
        registry.register(make_system("a", &log), "a").unwrap();
        registry.register(make_system("b", &log), "b").unwrap();
        registry.register(make_system("c", &log), "c").unwrap();

        assert_eq!(registry.initialise_all(&mut world), 3);
        assert_eq!(world.router().len(), 3);
        registry.update_all(&mut world, 0.1);
        registry.shutdown_all(&mut world);

        assert_eq!(
            entries(&log),
            vec![
                "init:a", "init:b", "init:c", "update:a", "update:b", "update:c", "shutdown:c",
                "shutdown:b", "shutdown:a",
            ]
        );
        assert!(world.router().is_empty());
        assert_eq!(registry.state("b"), Some(SystemState::Shutdown));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let log = Log::default();
        let mut registry = SystemRegistry::new();
        registry.register(make_system("a", &log), "combat").unwrap();
        assert!(matches!(
            registry.register(make_system("b", &log), "combat"),
            Err(SystemError::DuplicateSystem(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_init_does_not_block_others() {
        let log = Log::default();
        let mut world = make_world();
        let mut registry = SystemRegistry::new();
        registry.register(make_system("a", &log), "a").unwrap();
        registry
            .register(
                Recording {
                    fail_init: true,
                    ..make_system("b", &log)
                },
                "b",
            )
            .unwrap();
        registry.register(make_system("c", &log), "c").unwrap();

        assert_eq!(registry.initialise_all(&mut world), 2);
        assert_eq!(registry.state("b"), Some(SystemState::Failed));
        // b's handler was withdrawn.
        assert_eq!(world.router().len(), 2);

        registry.update_all(&mut world, 0.1);
        registry.shutdown_all(&mut world);
        assert_eq!(
            entries(&log),
            vec![
                "init:a", "init:b", "init:c", "update:a", "update:c", "shutdown:c", "shutdown:a",
            ]
        );
    }

    #[test]
    fn test_failed_subscription_fails_init() {
        let log = Log::default();
        let mut world = make_world();
        let mut registry = SystemRegistry::new();
        registry
            .register(
                Recording {
                    subscribe_unregistered: true,
                    ..make_system("a", &log)
                },
                "a",
            )
            .unwrap();
        assert_eq!(registry.initialise_all(&mut world), 0);
        assert_eq!(registry.expect_state("a").unwrap(), SystemState::Failed);
        assert!(world.router().is_empty());
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_failed_update_disables_system() {
        let log = Log::default();
        let mut world = make_world();
        let mut registry = SystemRegistry::new();
        registry
            .register(
                Recording {
                    fail_update: true,
                    ..make_system("a", &log)
                },
                "a",
            )
            .unwrap();
        registry.register(make_system("b", &log), "b").unwrap();
        registry.initialise_all(&mut world);

        registry.update_all(&mut world, 0.1);
        registry.update_all(&mut world, 0.1);
        assert_eq!(registry.running(), 1);
        assert_eq!(world.router().len(), 1);

        // A system that ran before failing still gets its shutdown hook.
        registry.shutdown_all(&mut world);
        assert_eq!(
            entries(&log),
            vec![
                "init:a", "init:b", "update:a", "update:b", "update:b", "shutdown:b", "shutdown:a",
            ]
        );
    }

    #[test]
    fn test_shutdown_failure_is_swallowed() {
        let log = Log::default();
        let mut world = make_world();
        let mut registry = SystemRegistry::new();
        registry.register(make_system("a", &log), "a").unwrap();
        registry
            .register(
                Recording {
                    fail_shutdown: true,
                    ..make_system("b", &log)
                },
                "b",
            )
            .unwrap();
        registry.initialise_all(&mut world);
        registry.shutdown_all(&mut world);
        registry.shutdown_all(&mut world);

        assert_eq!(
            entries(&log),
            vec!["init:a", "init:b", "shutdown:b", "shutdown:a"]
        );
        assert_eq!(registry.state("a"), Some(SystemState::Shutdown));
        assert_eq!(registry.state("b"), Some(SystemState::Shutdown));
    }

    #[test]
    fn test_unknown_state() {
        let registry = SystemRegistry::new();
        assert!(registry.state("ghost").is_none());
        assert!(matches!(
            registry.expect_state("ghost"),
            Err(SystemError::UnknownSystem(_))
        ));
    }
}
