//! # Time Source Module
//!
//! The engine needs two notions of time: a monotonic `Instant` for durations
//! (active time, latency windows) and a wall-clock `DateTime<Utc>` for stamps
//! shown to the user and compared against wearable sample timestamps.
//!
//! `SystemClock` reads the real clocks. `ManualClock` only moves when told to,
//! which makes session replays and tests deterministic.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Monotonic time used for every duration computation
    fn now(&self) -> Instant;

    /// Wall-clock time used for stamps and biometric freshness
    fn wall(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that advances only through `advance`.
///
/// Both readings move together, so `wall()` minus the starting wall time always
/// equals `now()` minus the starting instant.
#[derive(Debug)]
pub struct ManualClock {
    base_instant: Instant,
    base_wall: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            base_instant: Instant::now(),
            base_wall: wall,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + self.offset()
    }

    fn wall(&self) -> DateTime<Utc> {
        // Offsets stay far below chrono's range limit; saturate just in case.
        let offset = chrono::Duration::from_std(self.offset()).unwrap_or(chrono::Duration::MAX);
        self.base_wall + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_both_readings() {
        let clock = ManualClock::new();
        let start = clock.now();
        let start_wall = clock.wall();

        clock.advance_secs(5);
        clock.advance_millis(250);

        assert_eq!(clock.now() - start, Duration::from_millis(5_250));
        assert_eq!((clock.wall() - start_wall).num_milliseconds(), 5_250);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
