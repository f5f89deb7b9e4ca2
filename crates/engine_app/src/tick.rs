//! Fixed-timestep game-state driver.
//!
//! Each tick advances the active module environment by one step:
//!
//! 1. Rebuild the environment from its modules if a reload is due.
//! 2. Run every running system's update hook, in registration order.
//! 3. Advance the tick counter.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use engine_system::{EnvironmentError, EnvironmentManager, Module};

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Rebuild the module environment every this many ticks (0 = never).
    pub reload_every: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            reload_every: 0,
        }
    }
}

/// The driver's tick loop state.
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    config: TickConfig,
    modules: Vec<Arc<dyn Module>>,
    manager: EnvironmentManager,
}

impl TickLoop {
    /// Build and activate the environment for `modules`.
    pub fn new(config: TickConfig, modules: Vec<Arc<dyn Module>>) -> Result<Self, EnvironmentError> {
        let mut manager = EnvironmentManager::new();
        manager.switch_to(&modules)?;
        Ok(Self {
            tick_id: 0,
            config,
            modules,
            manager,
        })
    }

    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn manager(&self) -> &EnvironmentManager {
        &self.manager
    }

    /// Rebuild the environment from the same modules. On failure the
    /// current environment keeps running.
    pub fn reload(&mut self) -> Result<(), EnvironmentError> {
        self.manager.switch_to(&self.modules)
    }

    /// Run one tick of the simulation.
    pub fn tick(&mut self, dt: f64) {
        let every = self.config.reload_every;
        if every > 0 && self.tick_id > 0 && self.tick_id % every == 0 {
            info!(tick_id = self.tick_id, "reloading module environment");
            if let Err(err) = self.reload() {
                warn!(tick_id = self.tick_id, error = %err, "reload failed");
            }
        }

        self.tick_id += 1;
        let active = self.manager.tick(dt as f32);
        debug!(tick_id = self.tick_id, dt, active, "tick");
    }

    /// Run the tick loop for the configured number of ticks, or indefinitely.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            let dt = tick_duration.as_secs_f64();
            self.tick(dt);

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }

    /// Tear down the active environment.
    pub fn shutdown(&mut self) {
        self.manager.shutdown();
    }
}

impl fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickLoop")
            .field("tick_id", &self.tick_id)
            .field("config", &self.config)
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("manager", &self.manager)
            .finish()
    }
}
