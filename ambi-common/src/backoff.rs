//! Exponential reconnect backoff
//!
//! Delay before retry `n` (zero-based count of consecutive failures) is
//! `min(base * 2^n, cap)`. Any successful connection resets the counter so
//! the next failure waits `base` again.

use std::time::Duration;

/// Default delay before the first retry
pub const DEFAULT_BASE: Duration = Duration::from_secs(1);

/// Default upper bound on any single delay
pub const DEFAULT_CAP: Duration = Duration::from_secs(30);

/// Capped exponential backoff policy with a running attempt counter
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff policy. `cap` is raised to `base` if it is smaller.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempt: 0,
        }
    }

    /// Delay for a given zero-based attempt number, without touching the counter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay to wait before the next retry; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Number of consecutive failures recorded since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Forget all failures (call after a successful connection)
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP)
    }
}
