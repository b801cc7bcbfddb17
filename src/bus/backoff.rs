//! Reconnect pacing for the bus subscriber

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomized either way (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Exponential backoff with jitter. The first delay equals `initial`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let growth = self.config.multiplier.powi(self.attempt.min(32) as i32);
        let base = (self.config.initial.as_millis() as f64 * growth)
            .min(self.config.max.as_millis() as f64);
        self.attempt = self.attempt.saturating_add(1);

        let millis = if self.config.jitter > 0.0 {
            let spread = base * self.config.jitter;
            base + rand::rng().random_range(-spread..=spread)
        } else {
            base
        };

        Duration::from_millis(millis.max(1.0) as u64)
    }

    /// Call after a successful (re)connect
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}
