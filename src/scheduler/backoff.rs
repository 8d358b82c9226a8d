// src/scheduler/backoff.rs

use crate::config::TargetConfig;
use std::time::Duration;

/// Share of the delay that jitter may shave off.
const JITTER_RATIO: f64 = 0.25;

/// Probe interval policy for one target.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn for_target(target: &TargetConfig) -> Self {
        Self::new(target.interval(), target.backoff_max(), target.jitter)
    }

    /// Delay before the next probe given the current failure streak.
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.base;
        }

        let base = self.base.as_millis() as u64;
        let max = self.max.as_millis() as u64;

        // Exponential backoff: base * 2^failures
        let exponential = base.saturating_mul(2u64.saturating_pow(consecutive_failures));

        // Cap at maximum
        let capped = exponential.min(max);

        // Jitter only shortens, so the cap holds
        let delay = if self.jitter {
            let jitter = (capped as f64 * rand::random::<f64>() * JITTER_RATIO) as u64;
            (capped - jitter).max(base)
        } else {
            capped
        };

        Duration::from_millis(delay)
    }
}
