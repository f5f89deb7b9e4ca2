//! The demo module: creatures that wander, take periodic damage and die,
//! and a chest that owns its loot.

use engine_component::{Component, Entity, Event, OnAdded, reflect};
use engine_ecs::{Subscription, World, priority};
use engine_math::{Transform3D, Vec3};
use engine_prefab::{Prefab, load_prefabs};
use engine_reflect::{TypeLibrary, TypeLibraryBuilder};
use engine_system::{Module, System};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const PREFABS: &str = include_str!("../assets/demo_prefabs.json");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

reflect!(Health {
    current: f32 => [replicated],
    max: f32,
});

impl Component for Health {
    fn type_name() -> &'static str {
        "demo:Health"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
}

reflect!(Velocity {
    linear: Vec3 => [replicated],
});

impl Component for Velocity {
    fn type_name() -> &'static str {
        "demo:Velocity"
    }
}

/// Flat damage reduction applied before health is touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Armour {
    pub absorb: f32,
}

reflect!(Armour { absorb: f32 });

impl Component for Armour {
    fn type_name() -> &'static str {
        "demo:Armour"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<Entity>,
}

reflect!(Inventory {
    items: Vec<Entity> => [owned, replicated],
});

impl Component for Inventory {
    fn type_name() -> &'static str {
        "demo:Inventory"
    }
}

#[derive(Debug, Default)]
pub struct Damage {
    pub amount: f32,
    pub consumed: bool,
}

reflect!(Damage {
    amount: f32,
    consumed: bool,
});

impl Event for Damage {
    fn type_name() -> &'static str {
        "demo:Damage"
    }

    fn is_consumable() -> bool {
        true
    }

    fn is_consumed(&self) -> bool {
        self.consumed
    }
}

/// Spawns the configured prefabs and a looted chest when activated.
struct Spawner {
    prefabs: Vec<String>,
}

impl System for Spawner {
    fn initialise(&mut self, world: &mut World) -> anyhow::Result<()> {
        for prefab in &self.prefabs {
            let entity = world.create_from(prefab)?;
            debug!(prefab = prefab.as_str(), entity = %entity, "spawned");
        }

        let chest = world.create_from("demo:chest")?;
        let loot = world.create_from("demo:dagger")?;
        world.modify::<Inventory, _>(chest, |inv| inv.items.push(loot))?;
        let copy = world.copy_entity(chest)?;

        info!(
            entities = world.entity_count(),
            chest = %chest,
            copy = %copy,
            "demo world populated"
        );
        Ok(())
    }

    fn shutdown(&mut self, world: &mut World) -> anyhow::Result<()> {
        info!(
            survivors = world.component_count::<Health>(),
            entities = world.entity_count(),
            "demo world closing"
        );
        Ok(())
    }
}

/// Integrates velocity into position.
struct Movement;

impl System for Movement {
    fn update(&mut self, world: &mut World, delta: f32) -> anyhow::Result<()> {
        let moving: Vec<(Entity, Vec3)> = world
            .iter_with::<Velocity>()
            .map(|(entity, velocity)| (entity, velocity.linear))
            .collect();
        for (entity, linear) in moving {
            if world.has::<Transform3D>(entity) {
                world.modify::<Transform3D, _>(entity, |t| t.position += linear * delta)?;
            }
        }
        Ok(())
    }
}

/// Deals `damage` to every creature once per `interval` seconds and
/// resolves damage through armour and health handlers.
struct Combat {
    interval: f32,
    damage: f32,
    elapsed: f32,
}

impl Combat {
    fn armour(world: &mut World, entity: Entity, event: &mut Damage) {
        let Some(armour) = world.get::<Armour>(entity) else {
            return;
        };
        event.amount -= armour.absorb;
        if event.amount <= 0.0 {
            event.consumed = true;
        }
    }

    fn health(world: &mut World, entity: Entity, event: &mut Damage) {
        let remaining = world.modify::<Health, _>(entity, |health| {
            health.current = (health.current - event.amount).max(0.0);
            health.current
        });
        match remaining {
            Ok(current) if current <= 0.0 => {
                info!(entity = %entity, "creature died");
                if let Err(err) = world.destroy(entity) {
                    warn!(entity = %entity, error = %err, "failed to destroy dead creature");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(entity = %entity, error = %err, "damage lost"),
        }
    }
}

impl System for Combat {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::on::<Damage, _>(Self::armour)
                .requires::<Armour>()
                .priority(priority::HIGH),
            Subscription::on::<Damage, _>(Self::health).requires::<Health>(),
            Subscription::on::<OnAdded, _>(|_, entity, _| {
                debug!(entity = %entity, "creature gained health");
            })
            .requires::<Health>()
            .priority(priority::TRIVIAL),
        ]
    }

    fn update(&mut self, world: &mut World, delta: f32) -> anyhow::Result<()> {
        self.elapsed += delta;
        while self.elapsed >= self.interval {
            self.elapsed -= self.interval;
            let targets: Vec<Entity> = world.iter_with::<Health>().map(|(e, _)| e).collect();
            for target in targets {
                // An earlier target's death may have taken this one with it.
                if world.is_alive(target) {
                    world.send(
                        target,
                        Damage {
                            amount: self.damage,
                            consumed: false,
                        },
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Demo content, optionally extended with prefabs from an extra JSON file.
#[derive(Debug, Clone)]
pub struct DemoModule {
    spawn: Vec<String>,
    extra_prefabs: Option<String>,
}

impl DemoModule {
    #[must_use]
    pub fn new(spawn: Vec<String>) -> Self {
        Self {
            spawn,
            extra_prefabs: None,
        }
    }

    /// Load additional prefab definitions from `json` on every build.
    #[must_use]
    pub fn with_extra_prefabs(mut self, json: Option<String>) -> Self {
        self.extra_prefabs = json;
        self
    }
}

impl Module for DemoModule {
    fn name(&self) -> &str {
        "demo"
    }

    fn register_types(&self, types: &mut TypeLibraryBuilder) {
        types
            .component::<Health>()
            .component::<Velocity>()
            .component::<Armour>()
            .component::<Inventory>()
            .component::<Transform3D>()
            .event::<Damage>();
    }

    fn load_prefabs(&self, library: &TypeLibrary) -> anyhow::Result<Vec<Prefab>> {
        let mut prefabs = load_prefabs(PREFABS, library)?;
        if let Some(extra) = &self.extra_prefabs {
            prefabs.extend(load_prefabs(extra, library)?);
        }
        Ok(prefabs)
    }

    fn systems(&self) -> Vec<(String, Box<dyn System>)> {
        vec![
            (
                "demo:spawner".to_string(),
                Box::new(Spawner {
                    prefabs: self.spawn.clone(),
                }),
            ),
            ("demo:movement".to_string(), Box::new(Movement)),
            (
                "demo:combat".to_string(),
                Box::new(Combat {
                    interval: 1.0,
                    damage: 12.0,
                    elapsed: 0.0,
                }),
            ),
        ]
    }
}
