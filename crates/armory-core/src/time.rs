//! Time system for tick-driven updates
//!
//! Every component in this crate is polled from a single update step, so time
//! is passed in explicitly rather than read from a global source:
//! - `Tick` - Logical update counter
//! - `Timestamp` - Session time in seconds
//! - `Clock` - Fixed-step clock that converts ticks into timestamps

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A discrete tick identifier (one update step)
pub type Tick = u64;

/// Session time in seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    /// The session start
    pub const ZERO: Timestamp = Timestamp(0.0);

    /// Create a timestamp from seconds
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Get the timestamp in seconds
    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `earlier` (negative if `earlier` is in the future)
    pub fn since(&self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }

    /// Absolute distance in seconds between two timestamps
    pub fn distance(&self, other: Timestamp) -> f64 {
        (self.0 - other.0).abs()
    }
}

impl Add<f64> for Timestamp {
    type Output = Timestamp;

    fn add(self, secs: f64) -> Timestamp {
        Timestamp(self.0 + secs)
    }
}

impl Sub<f64> for Timestamp {
    type Output = Timestamp;

    fn sub(self, secs: f64) -> Timestamp {
        Timestamp(self.0 - secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Fixed-step update clock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clock {
    /// Current tick number
    pub tick: Tick,
    /// Seconds per tick
    pub tick_interval: f64,
    /// Session time at tick 0
    pub origin: Timestamp,
}

impl Clock {
    /// Default update rate (30 Hz, matching the prediction tick of the equipment layer)
    pub const DEFAULT_TICK_INTERVAL: f64 = 1.0 / 30.0;

    /// Create a new clock at tick 0
    pub fn new() -> Self {
        Self::with_tick_interval(Self::DEFAULT_TICK_INTERVAL)
    }

    /// Create a clock with a custom step size
    pub fn with_tick_interval(tick_interval: f64) -> Self {
        Self {
            tick: 0,
            tick_interval,
            origin: Timestamp::ZERO,
        }
    }

    /// Advance to the next tick
    pub fn advance(&mut self) {
        self.tick += 1;
    }

    /// Advance by the number of ticks covering `secs`
    pub fn advance_secs(&mut self, secs: f64) {
        let ticks = (secs / self.tick_interval).ceil().max(0.0) as u64;
        self.tick += ticks;
    }

    /// Current session time
    pub fn now(&self) -> Timestamp {
        self.origin + self.tick as f64 * self.tick_interval
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock() {
        let mut clock = Clock::with_tick_interval(0.5);
        assert_eq!(clock.tick, 0);
        assert_eq!(clock.now(), Timestamp::ZERO);

        clock.advance();
        assert_eq!(clock.tick, 1);
        assert_eq!(clock.now().as_secs(), 0.5);

        clock.advance_secs(2.0);
        assert_eq!(clock.tick, 5);
        assert_eq!(clock.now().as_secs(), 2.5);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_secs(10.0);
        assert_eq!((t + 2.0).as_secs(), 12.0);
        assert_eq!((t - 5.0).as_secs(), 5.0);
        assert_eq!(t.since(Timestamp::from_secs(4.0)), 6.0);
        assert_eq!(t.distance(Timestamp::from_secs(15.0)), 5.0);
        assert_eq!(t.to_string(), "10.000s");
    }
}
