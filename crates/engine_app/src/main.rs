//! # engine_app
//!
//! Runs the demo module environment on a fixed timestep.
//!
//! ## Startup Sequence
//!
//! 1. Parse the command line and install structured logging.
//! 2. Build the demo module environment, with any extra prefab file.
//! 3. Enter the fixed-timestep tick loop, then tear the environment down.

mod demo;
mod tick;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use demo::DemoModule;
use engine_system::Module;
use tick::{TickConfig, TickLoop};

#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Run the demo module environment")]
struct Args {
    /// Number of ticks to run (0 = unlimited).
    #[arg(long, default_value_t = 300)]
    ticks: u64,

    /// Target ticks per second.
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,

    /// Extra JSON prefab definitions to load alongside the demo prefabs.
    #[arg(long)]
    prefabs: Option<PathBuf>,

    /// Prefab to spawn at startup. May be repeated.
    #[arg(long = "spawn", default_values = ["demo:goblin", "demo:goblin"])]
    spawn: Vec<String>,

    /// Rebuild the module environment every this many ticks (0 = never).
    #[arg(long, default_value_t = 0)]
    reload_every: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let args = Args::parse();
    ensure!(args.tick_rate > 0.0, "--tick-rate must be positive");

    let extra = args
        .prefabs
        .as_ref()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read prefab file {}", path.display()))
        })
        .transpose()?;

    info!(spawn = ?args.spawn, "engine starting");

    let modules: Vec<Arc<dyn Module>> =
        vec![Arc::new(DemoModule::new(args.spawn).with_extra_prefabs(extra))];
    let config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.ticks,
        reload_every: args.reload_every,
    };

    let mut tick_loop = TickLoop::new(config, modules).context("failed to build the demo environment")?;
    tick_loop.run();
    tick_loop.shutdown();

    info!("engine shut down");
    Ok(())
}
