//! The `System` trait.

use std::fmt;

use engine_ecs::{Subscription, World};

/// A named logic unit with an init, update and shutdown lifecycle.
///
/// Event handlers are declared through [`System::subscriptions`]; the
/// registry subscribes them before [`System::initialise`] runs and
/// withdraws them when the system fails or shuts down.
pub trait System {
    /// Event handlers to install while the system is running.
    fn subscriptions(&self) -> Vec<Subscription> {
        Vec::new()
    }

    fn initialise(&mut self, world: &mut World) -> anyhow::Result<()> {
        let _ = world;
        Ok(())
    }

    /// Per-tick hook. `delta` is the elapsed simulation time in seconds.
    fn update(&mut self, world: &mut World, delta: f32) -> anyhow::Result<()> {
        let _ = (world, delta);
        Ok(())
    }

    fn shutdown(&mut self, world: &mut World) -> anyhow::Result<()> {
        let _ = world;
        Ok(())
    }
}

/// Lifecycle position of a registered system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemState {
    /// Registered but not yet initialised.
    Registered,
    Running,
    /// Initialisation or an update failed. The system is skipped on later
    /// ticks.
    Failed,
    Shutdown,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registered => "registered",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Shutdown => "shutdown",
        })
    }
}
