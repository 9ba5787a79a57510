//! Fixed-rate tick clock.
//!
//! Accumulates real elapsed time and releases it as discrete simulation
//! ticks. After a frame hitch several ticks can be consumed in one frame;
//! the catch-up cap bounds that work during long stalls.

use rewind_config::SimulationConfig;
use rewind_net::Tick;

/// Default maximum number of ticks consumed in a single frame.
pub const DEFAULT_MAX_CATCH_UP: u32 = 8;

/// Converts elapsed wall-clock time into a monotonic sequence of ticks.
///
/// ```
/// use rewind_netcode::TickClock;
///
/// let mut clock = TickClock::new(64);
/// clock.advance(3.0 / 64.0);
/// let mut ticks = 0;
/// while clock.consume_tick() {
///     ticks += 1;
/// }
/// assert_eq!(ticks, 3);
/// assert_eq!(clock.tick(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct TickClock {
    accumulator_secs: f64,
    tick_duration_secs: f64,
    tick: Tick,
    max_catch_up: Option<u32>,
    consumed_this_frame: u32,
    dropped_ticks: u64,
}

impl TickClock {
    /// Creates a clock at `tick_rate` Hz with the default catch-up cap.
    pub fn new(tick_rate: u32) -> Self {
        Self {
            accumulator_secs: 0.0,
            tick_duration_secs: 1.0 / f64::from(tick_rate.max(1)),
            tick: 0,
            max_catch_up: Some(DEFAULT_MAX_CATCH_UP),
            consumed_this_frame: 0,
            dropped_ticks: 0,
        }
    }

    /// Creates a clock from simulation settings.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.tick_rate).with_max_catch_up(config.max_catch_up)
    }

    /// Sets the per-frame catch-up cap. `None` removes it.
    pub fn with_max_catch_up(mut self, max_catch_up: Option<u32>) -> Self {
        self.max_catch_up = max_catch_up;
        self
    }

    /// Adds elapsed time and starts a new frame.
    ///
    /// Negative or non-finite values are ignored.
    pub fn advance(&mut self, elapsed_secs: f64) {
        self.consumed_this_frame = 0;
        if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
            tracing::trace!("ignoring invalid elapsed time {elapsed_secs}");
            return;
        }
        self.accumulator_secs += elapsed_secs;
    }

    /// Consumes one tick if a full period has accumulated.
    ///
    /// Call in a loop until it returns `false`. Once the catch-up cap is
    /// reached for this frame, the remaining whole periods are discarded
    /// (the fractional remainder is kept) so a long stall does not turn into
    /// a burst of simulation work.
    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator_secs < self.tick_duration_secs {
            return false;
        }

        if let Some(cap) = self.max_catch_up
            && self.consumed_this_frame >= cap
        {
            let backlog = (self.accumulator_secs / self.tick_duration_secs).floor();
            self.accumulator_secs -= backlog * self.tick_duration_secs;
            self.dropped_ticks += backlog as u64;
            tracing::warn!(
                tick = self.tick,
                dropped = backlog as u64,
                "catch-up cap of {cap} ticks reached, discarding backlog"
            );
            return false;
        }

        self.accumulator_secs -= self.tick_duration_secs;
        self.tick = self.tick.saturating_add(1);
        self.consumed_this_frame += 1;
        true
    }

    /// The most recently consumed tick (0 before the first one).
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Duration of one tick in seconds.
    pub fn tick_duration_secs(&self) -> f64 {
        self.tick_duration_secs
    }

    /// Fraction of the next tick already accumulated, in `[0, 1)`.
    pub fn alpha(&self) -> f64 {
        (self.accumulator_secs / self.tick_duration_secs).clamp(0.0, 1.0)
    }

    /// Total ticks discarded by the catch-up cap.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }
}
