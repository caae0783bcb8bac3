//! Exponential reconnect backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Reconnect delay parameters: `min(max, base * 2^attempt)` scaled by a
/// uniform jitter factor so a fleet of clients does not thundering-herd the
/// server after an outage.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Lower bound of the jitter band around 1.0.
    pub jitter_low: f64,
    /// Upper bound of the jitter band around 1.0.
    pub jitter_high: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_low: 0.8,
            jitter_high: 1.2,
        }
    }
}

impl ReconnectConfig {
    /// Jittered delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        let capped = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(self.jitter_low..=self.jitter_high);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }
}

/// Ephemeral reconnect bookkeeping. Reset to zero on every successful open
/// and on every explicit disconnect.
#[derive(Debug, Default)]
pub struct ReconnectPlan {
    attempt: u32,
}

impl ReconnectPlan {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay for the next scheduled reconnect; increments the attempt
    /// counter.
    pub fn next_delay(&mut self, config: &ReconnectConfig) -> Duration {
        let delay = config.delay_for_attempt(self.attempt);
        self.attempt += 1;
        delay
    }
}
