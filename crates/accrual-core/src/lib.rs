//! Clock, tick scheduler, simulation context, and async runner for the
//! Accrual simulation.
//!
//! Data flow per tick: the [`Scheduler`] samples the [`Clock`], computes the
//! real and simulated deltas, and calls the registered handlers in order.
//! The built-in handlers accrue resources, advance the active task against
//! wall-clock time (granting rewards when it completes), and unlock newly
//! eligible tasks.
//!
//! # Modules
//!
//! - [`clock`] -- [`TimeSource`], [`SystemTimeSource`],
//!   [`ManualTimeSource`] and the delta-measuring [`Clock`].
//! - [`scheduler`] -- [`Scheduler`], [`TickHandler`], fault isolation and
//!   stale-delta clamping.
//! - [`handlers`] -- The built-in accrual, task progress and requirement
//!   sweep handlers.
//! - [`simulation`] -- The [`Simulation`] context and its command surface.
//! - [`snapshot`] -- JSON export and restore for persistence.
//! - [`config`] -- Configuration loading from `accrual-config.yaml`.
//! - [`catalog`] -- The data-defined resources and tasks.
//! - [`runner`] -- [`run_simulation`], the single async loop.
//!
//! [`Clock`]: clock::Clock
//! [`TimeSource`]: clock::TimeSource
//! [`SystemTimeSource`]: clock::SystemTimeSource
//! [`ManualTimeSource`]: clock::ManualTimeSource
//! [`Scheduler`]: scheduler::Scheduler
//! [`TickHandler`]: scheduler::TickHandler
//! [`Simulation`]: simulation::Simulation
//! [`run_simulation`]: runner::run_simulation

pub mod catalog;
pub mod clock;
pub mod config;
pub mod handlers;
pub mod runner;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;

pub use catalog::{Catalog, CatalogError};
pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use config::{ConfigError, SimulationConfig};
pub use runner::{
    NoOpCallback, RunBounds, RunEndReason, RunResult, SimulationHandle, TickCallback, log_run_end,
    run_simulation,
};
pub use scheduler::{HandlerError, HandlerToken, Scheduler, SchedulerError, TickHandler};
pub use simulation::{Simulation, SimulationState};
pub use snapshot::{RestoreReport, SnapshotError};
