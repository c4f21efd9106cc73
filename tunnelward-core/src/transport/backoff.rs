//! Exponential backoff for edge redials

use rand::Rng;
use std::time::Duration;
use tunnelward_common::TransportConfig;

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay
    pub base: Duration,
    /// Maximum delay
    pub max: Duration,
    /// Multiplier for each attempt
    pub factor: f64,
    /// Jitter factor (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.3,
        }
    }
}

impl From<&TransportConfig> for BackoffConfig {
    fn from(config: &TransportConfig) -> Self {
        Self {
            base: config.backoff_base,
            max: config.backoff_max,
            ..Self::default()
        }
    }
}

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Get the next delay and increment attempt counter
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.calculate_delay();
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    fn calculate_delay(&self) -> Duration {
        let base_secs = self.config.base.as_secs_f64();
        let attempt = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let exp_delay = base_secs * self.config.factor.powi(attempt);

        let jitter_range = exp_delay * self.config.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        let capped = (exp_delay + jitter)
            .max(0.0)
            .min(self.config.max.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Tracks consecutive dial failures for one edge connection.
#[derive(Debug)]
pub struct RetryBudget {
    backoff: Backoff,
    retries: u32,
}

impl RetryBudget {
    #[must_use]
    pub fn new(config: BackoffConfig, retries: u32) -> Self {
        Self {
            backoff: Backoff::new(config),
            retries,
        }
    }

    pub fn on_connected(&mut self) {
        self.backoff.reset();
    }

    /// Delay before the next dial, or `None` once the budget is spent.
    pub fn on_failure(&mut self) -> Option<Duration> {
        if self.backoff.attempts() >= self.retries {
            return None;
        }
        Some(self.backoff.next_delay())
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.backoff.attempts()
    }
}
