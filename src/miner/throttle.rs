// src/miner/throttle.rs
//! Duty-cycle policy
//!
//! A throttle of `t` percent gives each cycle `max(1, 100 - t)` ms of hashing
//! followed by `max(1, t)` ms of sleep. Neither phase is ever zero, so even
//! throttle 0 yields briefly (≈99 % duty) and the unit still gets a chance
//! to read its command channel.

use std::time::Duration;

/// Highest throttle accepted by the coordinator
pub const MAX_THROTTLE: u8 = 90;

/// Work/sleep split for one duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    /// Hashing phase length in milliseconds
    pub work_ms: u64,
    /// Sleep phase length in milliseconds
    pub sleep_ms: u64,
}

impl DutyCycle {
    /// Derives the cycle from a throttle percentage
    pub fn from_throttle(throttle_pct: u8) -> Self {
        let throttle = u64::from(throttle_pct.min(100));
        DutyCycle {
            work_ms: (100 - throttle).max(1),
            sleep_ms: throttle.max(1),
        }
    }

    /// Hashing phase
    pub fn work(&self) -> Duration {
        Duration::from_millis(self.work_ms)
    }

    /// Sleep phase
    pub fn sleep(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    /// Share of the cycle spent hashing, in percent
    pub fn percent(&self) -> f64 {
        self.work_ms as f64 / (self.work_ms + self.sleep_ms) as f64 * 100.0
    }
}
