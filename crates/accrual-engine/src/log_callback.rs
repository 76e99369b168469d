//! Tick callback that reports simulation progress through `tracing`.

use accrual_core::{Simulation, TickCallback};
use accrual_types::TickSample;
use tracing::{debug, info};

/// Logs a summary line every `every` ticks and a debug line otherwise.
pub struct LogCallback {
    every: u64,
}

impl LogCallback {
    /// Log a summary every `every` ticks (at least 1).
    pub const fn new(every: u64) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
        }
    }
}

impl TickCallback for LogCallback {
    fn on_tick(&mut self, sample: &TickSample, simulation: &Simulation) {
        let active = simulation.tasks().active_task();
        if sample.tick.checked_rem(self.every) == Some(0) {
            let progress = active
                .and_then(|id| simulation.task_progress(id))
                .map(|p| p.progress);
            info!(
                tick = sample.tick,
                resources = simulation.ledger().len(),
                active_task = ?active.map(accrual_types::TaskId::as_str),
                progress = ?progress,
                "Simulation progress"
            );
        } else {
            debug!(
                tick = sample.tick,
                simulated_delta = %sample.simulated_delta_seconds,
                "Tick"
            );
        }
    }
}
