//! Time sources and the scheduler clock.
//!
//! The clock reads two kinds of time from a [`TimeSource`]:
//!
//! - **Monotonic** time, used for tick deltas. It never goes backwards, so
//!   a real delta is never negative.
//! - **Wall-clock** time in epoch milliseconds, used to anchor task start
//!   and end timestamps and to stamp snapshots.
//!
//! Production code uses [`SystemTimeSource`]. Tests drive time by hand with
//! [`ManualTimeSource`], which makes every tick delta deterministic.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;

/// Microseconds per second, the precision real deltas are kept at.
const MICROS_SCALE: u32 = 6;

/// A source of monotonic and wall-clock time.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Monotonic time elapsed since an arbitrary fixed origin.
    fn monotonic(&self) -> Duration;

    /// Wall-clock time, epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// The operating system clocks.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Create a source whose monotonic origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Debug)]
struct ManualState {
    monotonic_us: AtomicU64,
    wall_ms: AtomicI64,
}

/// A hand-driven time source. Clones share the same time.
///
/// ```
/// use std::time::Duration;
///
/// use accrual_core::clock::{ManualTimeSource, TimeSource};
///
/// let time = ManualTimeSource::new(1_000);
/// let handle = time.clone();
/// handle.advance(Duration::from_secs(2));
/// assert_eq!(time.now_ms(), 3_000);
/// ```
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    state: Arc<ManualState>,
}

impl ManualTimeSource {
    /// Create a source at monotonic zero and the given wall-clock time.
    pub fn new(wall_ms: i64) -> Self {
        Self {
            state: Arc::new(ManualState {
                monotonic_us: AtomicU64::new(0),
                wall_ms: AtomicI64::new(wall_ms),
            }),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        let _ = self
            .state
            .monotonic_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |us| {
                Some(us.saturating_add(micros))
            });
        let _ = self
            .state
            .wall_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ms| {
                Some(ms.saturating_add(millis))
            });
    }

    /// Move both clocks forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl TimeSource for ManualTimeSource {
    fn monotonic(&self) -> Duration {
        Duration::from_micros(self.state.monotonic_us.load(Ordering::Acquire))
    }

    fn now_ms(&self) -> i64 {
        self.state.wall_ms.load(Ordering::Acquire)
    }
}

/// One reading of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    /// Monotonic time since the previous sample.
    pub real_delta: Duration,
    /// Wall-clock time of this sample, epoch milliseconds.
    pub now_ms: i64,
}

/// Measures elapsed real time between samples.
#[derive(Debug, Clone)]
pub struct Clock {
    source: Arc<dyn TimeSource>,
    last: Duration,
}

impl Clock {
    /// Create a clock whose first delta is measured from now.
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let last = source.monotonic();
        Self { source, last }
    }

    /// Take a sample and restart the delta measurement.
    pub fn sample(&mut self) -> ClockSample {
        let now = self.source.monotonic();
        let real_delta = now.saturating_sub(self.last);
        self.last = now;
        ClockSample {
            real_delta,
            now_ms: self.source.now_ms(),
        }
    }

    /// Discard the elapsed time; the next delta is measured from now.
    pub fn reset(&mut self) {
        self.last = self.source.monotonic();
    }

    /// Current wall-clock time, epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.source.now_ms()
    }
}

/// Convert a duration to seconds at microsecond precision.
pub fn duration_to_seconds(duration: Duration) -> Decimal {
    let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
    Decimal::new(micros, MICROS_SCALE)
}
