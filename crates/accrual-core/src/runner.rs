//! Async simulation loop.
//!
//! [`run_simulation`] is the only loop that drives a [`Simulation`]. Each
//! iteration waits for one of three things:
//!
//! - **Tick deadline**: take the lock, run exactly one tick, call the
//!   [`TickCallback`], release.
//! - **Deferred reset**: the earliest cooldown reset is due. Resets run on
//!   their own timer, outside the tick path.
//! - **Wake**: [`SimulationHandle::stop`] or a reconfiguration cut the wait
//!   short.
//!
//! Because the loop is single and the state sits behind one mutex, at most
//! one tick is ever in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use accrual_types::TickSample;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::simulation::Simulation;

/// Reason the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEndReason {
    /// Reached [`RunBounds::max_ticks`].
    MaxTicksReached,
    /// [`SimulationHandle::stop`] was called.
    OperatorStop,
    /// The scheduler was stopped directly.
    SchedulerStopped,
}

/// Limits on a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunBounds {
    /// Stop after this many dispatched ticks (0 = unlimited).
    pub max_ticks: u64,
}

impl From<&crate::config::RunConfig> for RunBounds {
    fn from(config: &crate::config::RunConfig) -> Self {
        Self {
            max_ticks: config.max_ticks,
        }
    }
}

impl RunBounds {
    const fn tick_limit_reached(self, ticks: u64) -> bool {
        self.max_ticks > 0 && ticks >= self.max_ticks
    }
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// Ticks dispatched during this run.
    pub total_ticks: u64,
    /// Deferred resets applied during this run.
    pub resets_applied: u64,
    /// The last dispatched sample, if any.
    pub last_sample: Option<TickSample>,
}

/// Callback invoked after each dispatched tick, with read-only access.
pub trait TickCallback: Send {
    /// Called after a tick completes.
    fn on_tick(&mut self, sample: &TickSample, simulation: &Simulation);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _sample: &TickSample, _simulation: &Simulation) {}
}

#[derive(Debug)]
struct Shared {
    simulation: Mutex<Simulation>,
    wake: Notify,
    stop_requested: AtomicBool,
}

/// Shared ownership of a simulation for the runner and its controllers.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    shared: Arc<Shared>,
}

impl SimulationHandle {
    /// Wrap a simulation.
    pub fn new(simulation: Simulation) -> Self {
        Self {
            shared: Arc::new(Shared {
                simulation: Mutex::new(simulation),
                wake: Notify::new(),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Lock the simulation for commands or reads between ticks.
    pub async fn lock(&self) -> MutexGuard<'_, Simulation> {
        self.shared.simulation.lock().await
    }

    /// Ask the runner to end after the current iteration.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::Acquire)
    }

    /// Cut the runner's current wait short, for example after changing the
    /// tick rate.
    pub fn wake(&self) {
        self.shared.wake.notify_one();
    }

    /// Take the simulation back once no other handle exists.
    ///
    /// Returns the handle unchanged if it is still shared.
    pub fn into_inner(self) -> Result<Simulation, Self> {
        match Arc::try_unwrap(self.shared) {
            Ok(shared) => Ok(shared.simulation.into_inner()),
            Err(shared) => Err(Self { shared }),
        }
    }
}

enum Wake {
    Tick,
    Reset,
    Notified,
}

/// Run the simulation loop until a termination condition is met.
///
/// The loop ends when [`SimulationHandle::stop`] is called, when the
/// scheduler is stopped, or when `bounds.max_ticks` ticks have been
/// dispatched. Ticks sampled while paused are not dispatched and do not
/// count.
pub async fn run_simulation(
    handle: &SimulationHandle,
    bounds: RunBounds,
    callback: &mut dyn TickCallback,
) -> RunResult {
    let mut total_ticks: u64 = 0;
    let mut resets_applied: u64 = 0;
    let mut last_sample: Option<TickSample> = None;

    let (interval, tick_rate_hz) = {
        let sim = handle.lock().await;
        (sim.scheduler().tick_interval(), sim.scheduler().tick_rate_hz())
    };
    info!(max_ticks = bounds.max_ticks, %tick_rate_hz, "Simulation run starting");
    let mut next_tick_at = Instant::now() + interval;

    let end_reason = loop {
        if handle.is_stop_requested() {
            info!("Stop requested");
            break RunEndReason::OperatorStop;
        }

        let reset_wait = {
            let sim = handle.lock().await;
            if !sim.scheduler().is_running() {
                break RunEndReason::SchedulerStopped;
            }
            sim.next_reset_due().map(|due| {
                let ms = due.saturating_sub(sim.now_ms()).max(0);
                Duration::from_millis(u64::try_from(ms).unwrap_or(0))
            })
        };

        let wake = tokio::select! {
            () = tokio::time::sleep_until(next_tick_at) => Wake::Tick,
            () = tokio::time::sleep(reset_wait.unwrap_or_default()), if reset_wait.is_some() => Wake::Reset,
            () = handle.shared.wake.notified() => Wake::Notified,
        };

        match wake {
            Wake::Tick => {
                let mut sim = handle.lock().await;
                if let Some(sample) = sim.tick() {
                    total_ticks = total_ticks.saturating_add(1);
                    callback.on_tick(&sample, &sim);
                    last_sample = Some(sample);
                }
                next_tick_at = Instant::now() + sim.scheduler().tick_interval();
                drop(sim);
                if bounds.tick_limit_reached(total_ticks) {
                    info!(total_ticks, max_ticks = bounds.max_ticks, "Tick limit reached");
                    break RunEndReason::MaxTicksReached;
                }
            }
            Wake::Reset => {
                let reset = handle.lock().await.run_due_resets();
                let count = u64::try_from(reset.len()).unwrap_or(u64::MAX);
                resets_applied = resets_applied.saturating_add(count);
            }
            Wake::Notified => {
                let sim = handle.lock().await;
                next_tick_at = Instant::now() + sim.scheduler().tick_interval();
            }
        }
    };

    RunResult {
        end_reason,
        total_ticks,
        resets_applied,
        last_sample,
    }
}

/// Log the end of a run.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        resets_applied = result.resets_applied,
        final_tick = result.last_sample.map(|s| s.tick),
        "Simulation run ended"
    );
    if result.last_sample.is_none() {
        warn!("Simulation run ended with no ticks dispatched");
    }
}
