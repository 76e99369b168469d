//! Engine binary for the Accrual simulation.
//!
//! Wires the configuration, catalog, scheduler and async runner together
//! and drives the simulation until it is stopped or reaches its tick bound.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `accrual-config.yaml` (or `ACCRUAL_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Load the resource and task catalog
//! 4. Build the simulation and run an initial requirement sweep
//! 5. Install the Ctrl-C handler
//! 6. Run the simulation loop
//! 7. Write the final snapshot

mod error;
mod log_callback;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use accrual_core::config::LogFormat;
use accrual_core::runner::{self, RunBounds, SimulationHandle};
use accrual_core::{Catalog, Simulation, SimulationConfig, SystemTimeSource, snapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::log_callback::LogCallback;

/// Ticks between progress summaries in the log.
const LOG_EVERY_TICKS: u64 = 10;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails or the final
/// snapshot cannot be written.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load and validate configuration.
    let (config, config_found) = load_config()?;
    config.validate()?;

    // 2. Initialize structured logging.
    init_tracing(&config);
    info!("accrual-engine starting");
    if !config_found {
        info!("Config file not found, using defaults");
    }
    info!(
        tick_rate_hz = %config.scheduler.tick_rate_hz,
        time_scale = %config.scheduler.time_scale,
        stale_delta_ceiling_seconds = config.scheduler.stale_delta_ceiling_seconds,
        catalog = %config.catalog.path.display(),
        max_ticks = config.run.max_ticks,
        "Configuration loaded"
    );

    // 3. Load the catalog.
    let catalog = Catalog::from_file(&config.catalog.path)?;
    info!(
        resources = catalog.resources.len(),
        tasks = catalog.tasks.len(),
        "Catalog loaded"
    );

    // 4. Build the simulation.
    let mut simulation = Simulation::new(&config, Arc::new(SystemTimeSource::new()))?;
    simulation.load_catalog(catalog)?;
    if !simulation.scheduler().is_running() {
        simulation
            .scheduler_mut()
            .start(config.scheduler.tick_rate_hz)?;
    }
    let unlocked = simulation.check_all_requirements();
    info!(unlocked, "Initial requirement sweep complete");

    // 5. Stop cleanly on Ctrl-C.
    let handle = SimulationHandle::new(simulation);
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            signal_handle.stop();
        }
    });

    // 6. Run.
    let mut callback = LogCallback::new(LOG_EVERY_TICKS);
    let result = runner::run_simulation(&handle, RunBounds::from(&config.run), &mut callback).await;
    runner::log_run_end(&result);

    // 7. Write the final snapshot.
    let json = {
        let sim = handle.lock().await;
        snapshot::to_json(&sim.snapshot())?
    };
    write_snapshot(config.snapshot.path.as_deref(), &json)?;

    info!("accrual-engine shutdown complete");
    Ok(())
}

/// Load configuration from `ACCRUAL_CONFIG` or `accrual-config.yaml`.
///
/// Falls back to defaults (with env overrides) when the file does not
/// exist. The flag reports whether a file was read.
fn load_config() -> Result<(SimulationConfig, bool), EngineError> {
    let config_path = std::env::var("ACCRUAL_CONFIG")
        .map_or_else(|_| PathBuf::from("accrual-config.yaml"), PathBuf::from);
    if config_path.exists() {
        Ok((SimulationConfig::from_file(&config_path)?, true))
    } else {
        Ok((SimulationConfig::parse("")?, false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(config: &SimulationConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn write_snapshot(path: Option<&Path>, json: &str) -> Result<(), EngineError> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)?;
            info!(path = %path.display(), "Snapshot written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}
