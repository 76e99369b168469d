//! The tick scheduler.
//!
//! One [`Scheduler`] drives the whole simulation. Each call to
//! [`Scheduler::tick`] samples the [`Clock`], turns the real delta into a
//! [`TickSample`], and fans it out to every registered [`TickHandler`] in
//! registration order. `tick` takes `&mut self`, so a new tick cannot start
//! before the previous fan-out has returned.
//!
//! # Fault isolation
//!
//! A handler that returns an error, or panics, is logged and counted. The
//! remaining handlers still run and the scheduler keeps ticking.
//!
//! # Stale deltas
//!
//! A real delta longer than the stale-delta ceiling (default 300 seconds)
//! is clamped to the ceiling. A process that was suspended for an hour
//! therefore catches up at most five minutes of accrual.
//!
//! # Pause
//!
//! While paused the scheduler keeps sampling the clock but dispatches
//! nothing, and `resume` restarts the delta measurement, so resuming never
//! applies the paused interval.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use accrual_ledger::LedgerError;
use accrual_tasks::TaskError;
use accrual_types::{ErrorKind, TickSample};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, TimeSource, duration_to_seconds};
use crate::config::SchedulerConfig;
use crate::simulation::SimulationState;

/// Exclusive lower bound of the tick rate, in Hz.
pub const MIN_TICK_RATE_HZ: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// Inclusive upper bound of the tick rate, in Hz.
pub const MAX_TICK_RATE_HZ: Decimal = Decimal::from_parts(60, 0, 0, false, 0);

/// Microseconds per second.
const MICROS_PER_SECOND: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// A rate, scale or ceiling is out of range. The previous value is
    /// kept.
    #[error("invalid scheduler configuration: {reason}")]
    InvalidConfiguration {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl SchedulerError {
    /// Category of the error.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Error returned by a tick handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A ledger operation failed.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// A task operation failed.
    #[error("task error: {source}")]
    Task {
        /// The underlying task error.
        #[from]
        source: TaskError,
    },

    /// Any other handler failure.
    #[error("{reason}")]
    Failed {
        /// Explanation of the failure.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// A subscriber invoked once per tick.
///
/// Handlers must not block. Two handlers with the same [`name`] are the
/// same handler as far as registration is concerned.
///
/// [`name`]: TickHandler::name
pub trait TickHandler: Send {
    /// Stable identity of the handler.
    fn name(&self) -> &str;

    /// Handle one tick.
    fn on_tick(&mut self, sample: &TickSample, state: &mut SimulationState)
    -> Result<(), HandlerError>;
}

/// Capability to unregister a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerToken(u64);

struct Registration {
    token: HandlerToken,
    handler: Box<dyn TickHandler>,
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks dispatched.
    pub ticks: u64,
    /// Samples taken while paused (not dispatched).
    pub paused_samples: u64,
    /// Real deltas clamped to the stale-delta ceiling.
    pub clamped_deltas: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Drives time forward and fans each tick out to the handlers.
pub struct Scheduler {
    clock: Clock,
    handlers: Vec<Registration>,
    next_token: u64,
    running: bool,
    paused: bool,
    tick_rate_hz: Decimal,
    time_scale: Decimal,
    stale_delta_ceiling: Duration,
    tick: u64,
    stats: SchedulerStats,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("handlers", &self.handler_names())
            .field("running", &self.running)
            .field("paused", &self.paused)
            .field("tick_rate_hz", &self.tick_rate_hz)
            .field("time_scale", &self.time_scale)
            .field("stale_delta_ceiling", &self.stale_delta_ceiling)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a stopped scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfiguration`] if any configured
    /// value is out of range.
    pub fn new(
        source: Arc<dyn TimeSource>,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        validate_tick_rate(config.tick_rate_hz)?;
        validate_time_scale(config.time_scale)?;
        validate_ceiling(config.stale_delta_ceiling_seconds)?;
        Ok(Self {
            clock: Clock::new(source),
            handlers: Vec::new(),
            next_token: 0,
            running: false,
            paused: false,
            tick_rate_hz: config.tick_rate_hz,
            time_scale: config.time_scale,
            stale_delta_ceiling: Duration::from_secs(config.stale_delta_ceiling_seconds),
            tick: 0,
            stats: SchedulerStats::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Start / Stop
    // -----------------------------------------------------------------------

    /// Begin ticking at `tick_rate_hz`. No-op if already running.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfiguration`] for a rate outside
    /// `(0.1, 60]`.
    pub fn start(&mut self, tick_rate_hz: Decimal) -> Result<(), SchedulerError> {
        if self.running {
            debug!("Scheduler already running");
            return Ok(());
        }
        validate_tick_rate(tick_rate_hz)?;
        self.tick_rate_hz = tick_rate_hz;
        self.running = true;
        self.clock.reset();
        info!(tick_rate_hz = %tick_rate_hz, "Scheduler started");
        Ok(())
    }

    /// Stop ticking. Further calls to [`tick`](Self::tick) do nothing.
    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            info!(tick = self.tick, "Scheduler stopped");
        }
    }

    /// Whether the scheduler is running.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Stop advancing simulated time. Real time is still sampled.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            info!(tick = self.tick, "Scheduler paused");
        }
    }

    /// Resume dispatching, measuring the next delta from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.clock.reset();
            info!(tick = self.tick, "Scheduler resumed");
        }
    }

    /// Whether the scheduler is paused.
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // Rates
    // -----------------------------------------------------------------------

    /// Current tick rate in Hz.
    pub const fn tick_rate_hz(&self) -> Decimal {
        self.tick_rate_hz
    }

    /// Change the tick rate. Returns the previous rate.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfiguration`] for a rate outside
    /// `(0.1, 60]`; the current rate is kept.
    pub fn set_tick_rate(&mut self, hz: Decimal) -> Result<Decimal, SchedulerError> {
        validate_tick_rate(hz)?;
        let previous = std::mem::replace(&mut self.tick_rate_hz, hz);
        info!(previous = %previous, tick_rate_hz = %hz, "Tick rate changed");
        Ok(previous)
    }

    /// Real time between ticks at the current rate.
    pub fn tick_interval(&self) -> Duration {
        let micros = MICROS_PER_SECOND
            .checked_div(self.tick_rate_hz)
            .and_then(|us| us.trunc().to_u64())
            .unwrap_or(1_000_000);
        Duration::from_micros(micros)
    }

    /// Current time scale.
    pub const fn time_scale(&self) -> Decimal {
        self.time_scale
    }

    /// Change the real-to-simulated multiplier. Returns the previous scale.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfiguration`] unless `scale` is
    /// positive; the current scale is kept.
    pub fn set_time_scale(&mut self, scale: Decimal) -> Result<Decimal, SchedulerError> {
        validate_time_scale(scale)?;
        let previous = std::mem::replace(&mut self.time_scale, scale);
        info!(previous = %previous, time_scale = %scale, "Time scale changed");
        Ok(previous)
    }

    /// Largest real delta a single tick applies.
    pub const fn stale_delta_ceiling(&self) -> Duration {
        self.stale_delta_ceiling
    }

    /// Change the stale-delta ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfiguration`] for zero seconds.
    pub fn set_stale_delta_ceiling(&mut self, seconds: u64) -> Result<(), SchedulerError> {
        validate_ceiling(seconds)?;
        self.stale_delta_ceiling = Duration::from_secs(seconds);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// Add a handler after the existing ones.
    ///
    /// Registering a handler whose name is already registered adds nothing
    /// and returns the existing token.
    pub fn register(&mut self, handler: Box<dyn TickHandler>) -> HandlerToken {
        if let Some(existing) = self
            .handlers
            .iter()
            .find(|r| r.handler.name() == handler.name())
        {
            debug!(handler = handler.name(), "Handler already registered");
            return existing.token;
        }
        let token = HandlerToken(self.next_token);
        self.next_token = self.next_token.saturating_add(1);
        debug!(handler = handler.name(), "Handler registered");
        self.handlers.push(Registration { token, handler });
        token
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unregister(&mut self, token: HandlerToken) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|r| r.token != token);
        before != self.handlers.len()
    }

    /// Handler names in dispatch order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|r| r.handler.name()).collect()
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one iteration.
    ///
    /// Returns the dispatched sample, or `None` when stopped or paused.
    pub fn tick(&mut self, state: &mut SimulationState) -> Option<TickSample> {
        if !self.running {
            return None;
        }
        let clock_sample = self.clock.sample();
        if self.paused {
            self.stats.paused_samples = self.stats.paused_samples.saturating_add(1);
            return None;
        }

        let mut real_delta = clock_sample.real_delta;
        if real_delta > self.stale_delta_ceiling {
            warn!(
                real_delta_ms = real_delta.as_millis(),
                ceiling_ms = self.stale_delta_ceiling.as_millis(),
                "Stale delta clamped to ceiling"
            );
            real_delta = self.stale_delta_ceiling;
            self.stats.clamped_deltas = self.stats.clamped_deltas.saturating_add(1);
        }

        let real_delta_seconds = duration_to_seconds(real_delta);
        let simulated_delta_seconds = real_delta_seconds
            .checked_mul(self.time_scale)
            .unwrap_or(Decimal::MAX);
        self.tick = self.tick.saturating_add(1);
        let sample = TickSample {
            tick: self.tick,
            real_delta_seconds,
            simulated_delta_seconds,
            now_ms: clock_sample.now_ms,
        };

        for registration in &mut self.handlers {
            let handler = &mut registration.handler;
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler.on_tick(&sample, state)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(tick = sample.tick, handler = handler.name(), %err, "Tick handler failed");
                    self.stats.handler_failures = self.stats.handler_failures.saturating_add(1);
                }
                Err(payload) => {
                    error!(
                        tick = sample.tick,
                        handler = handler.name(),
                        panic = panic_message(payload.as_ref()),
                        "Tick handler panicked"
                    );
                    self.stats.handler_failures = self.stats.handler_failures.saturating_add(1);
                }
            }
        }

        self.stats.ticks = self.stats.ticks.saturating_add(1);
        debug!(
            tick = sample.tick,
            real_delta = %sample.real_delta_seconds,
            simulated_delta = %sample.simulated_delta_seconds,
            "Tick dispatched"
        );
        Some(sample)
    }

    /// Number of ticks dispatched.
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Set the tick counter, when restoring a snapshot.
    pub const fn set_tick_count(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Activity counters.
    pub const fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Current wall-clock time, epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn validate_tick_rate(hz: Decimal) -> Result<(), SchedulerError> {
    if hz <= MIN_TICK_RATE_HZ || hz > MAX_TICK_RATE_HZ {
        return Err(SchedulerError::InvalidConfiguration {
            reason: format!("tick rate must be in ({MIN_TICK_RATE_HZ}, {MAX_TICK_RATE_HZ}] Hz, got {hz}"),
        });
    }
    Ok(())
}

fn validate_time_scale(scale: Decimal) -> Result<(), SchedulerError> {
    if scale <= Decimal::ZERO {
        return Err(SchedulerError::InvalidConfiguration {
            reason: format!("time scale must be positive, got {scale}"),
        });
    }
    Ok(())
}

fn validate_ceiling(seconds: u64) -> Result<(), SchedulerError> {
    if seconds == 0 {
        return Err(SchedulerError::InvalidConfiguration {
            reason: "stale delta ceiling must be at least 1 second".to_owned(),
        });
    }
    Ok(())
}
