//! Sleep countdown
//!
//! Held in whole `Duration` steps so `0 <= remaining <= total` holds exactly;
//! minutes are derived for display.

use std::time::Duration;

/// Countdown toward the end of a sleep session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    total_minutes: u32,
    total: Duration,
    remaining: Duration,
}

impl Countdown {
    /// Create a full countdown of `total_minutes`
    pub fn new(total_minutes: u32) -> Self {
        let total = Duration::from_secs(u64::from(total_minutes) * 60);
        Self {
            total_minutes,
            total,
            remaining: total,
        }
    }

    /// Refill to the configured total
    pub fn reset(&mut self) {
        self.remaining = self.total;
    }

    /// Drain to zero
    pub fn exhaust(&mut self) {
        self.remaining = Duration::ZERO;
    }

    /// Subtract one tick, clamping at zero. Returns the new remaining time.
    pub fn tick(&mut self, step: Duration) -> Duration {
        self.remaining = self.remaining.saturating_sub(step);
        self.remaining
    }

    pub fn total_minutes(&self) -> u32 {
        self.total_minutes
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Remaining time in (fractional) minutes
    pub fn remaining_minutes(&self) -> f64 {
        self.remaining.as_secs_f64() / 60.0
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Remaining time as `mm:ss`
    pub fn display(&self) -> String {
        let secs = self.remaining.as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}
