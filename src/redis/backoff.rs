use std::time::Duration;

use rand::Rng;

use crate::config::RedisConfig;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay randomized in both directions
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&RedisConfig> for BackoffConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            initial_delay_ms: config.backoff_initial_delay_ms.max(1),
            max_delay_ms: config.backoff_max_delay_ms.max(config.backoff_initial_delay_ms),
            ..Self::default()
        }
    }
}

/// Delay schedule for reconnect attempts: the first delay is the initial one,
/// each following delay grows by `multiplier` up to `max_delay_ms`.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(32) as i32;
        self.attempt = self.attempt.saturating_add(1);

        let base = (self.config.initial_delay_ms as f64 * self.config.multiplier.powi(exponent))
            .min(self.config.max_delay_ms as f64);

        let delay = if self.config.jitter_factor > 0.0 {
            let spread = base * self.config.jitter_factor;
            base + rand::rng().random_range(-spread..=spread)
        } else {
            base
        };

        Duration::from_millis(delay.max(1.0) as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
