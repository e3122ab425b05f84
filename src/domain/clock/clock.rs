use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Raw reading of a monotonic tick counter. The counter wraps around, so two readings must
/// only be compared through [`Tick::elapsed_since`] / [`timeout_expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(pub u32);

impl Tick {
    /// Forward distance from `start` to `self`, correct across one counter wraparound.
    pub fn elapsed_since(self, start: Tick) -> u32 {
        self.0.wrapping_sub(start.0)
    }

    pub fn advanced_by(self, ticks: u32) -> Tick {
        Tick(self.0.wrapping_add(ticks))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

/// Returns true once at least `timeout` ticks have passed between `start` and `now`.
pub fn timeout_expired(start: Tick, now: Tick, timeout: u32) -> bool {
    now.elapsed_since(start) >= timeout
}

/// Source of monotonic ticks, immune to wall-clock resets.
pub trait TickSource: fmt::Debug + Send + Sync {
    fn now(&self) -> Tick;

    fn ticks_per_second(&self) -> u32;

    fn seconds_to_ticks(&self, seconds: u32) -> u32 {
        seconds.saturating_mul(self.ticks_per_second())
    }

    fn ticks_to_seconds(&self, ticks: u32) -> f64 {
        ticks as f64 / self.ticks_per_second().max(1) as f64
    }
}

pub type SharedTickSource = Arc<dyn TickSource>;

/// Tick source backed by `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    ticks_per_second: u32,
}

impl MonotonicClock {
    /// Same resolution as the classic `times()` clock.
    pub const DEFAULT_TICKS_PER_SECOND: u32 = 100;

    pub fn new() -> Self {
        Self::with_resolution(Self::DEFAULT_TICKS_PER_SECOND)
    }

    pub fn with_resolution(ticks_per_second: u32) -> Self {
        MonotonicClock { origin: Instant::now(), ticks_per_second: ticks_per_second.max(1) }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for MonotonicClock {
    fn now(&self) -> Tick {
        let elapsed = self.origin.elapsed();
        let ticks = elapsed.as_millis() * self.ticks_per_second as u128 / 1000;
        // truncation is the wraparound
        Tick(ticks as u32)
    }

    fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }
}
