//! # Backoff Calculation
//!
//! Exponential retry delays: `base * 2^failures`, capped at `max`.
//!
//! With the defaults (5ms base, 1000s cap) the sequence is
//! 5ms, 10ms, 20ms, 40ms, 80ms, ... until the cap is reached.

use std::time::Duration;

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next attempt after `failures` previous failures (0-indexed)
    pub fn delay_for(&self, failures: u32) -> Duration {
        // 2^31 already exceeds any sensible cap, avoid overflowing the multiplier
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
