//! Reconnection schedule
//!
//! Exponential backoff with a cap, a circuit breaker for sustained outages,
//! and an optional hard limit on consecutive failures.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Delay schedule between push connection attempts
///
/// `failures` counts consecutive attempts that never reached `Connected`.
/// A session that connected and later closed resets it to zero, so a
/// channel that keeps dropping is retried at the initial delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_ratio: f64,
    max_attempts: Option<u32>,
    circuit_breaker_threshold: u32,
    circuit_breaker_cooldown: Duration,
}

impl ReconnectPolicy {
    /// Same delay forever, the way a plain fixed-timer retry behaves
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_ratio: 0.0,
            max_attempts: None,
            circuit_breaker_threshold: 0,
            circuit_breaker_cooldown: delay,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the next attempt, or `None` to stop retrying
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if failures >= max_attempts {
                return None;
            }
        }

        if self.circuit_breaker_threshold > 0
            && failures > 0
            && failures % self.circuit_breaker_threshold == 0
        {
            return Some(self.circuit_breaker_cooldown);
        }

        Some(self.apply_jitter(self.base_delay(failures)))
    }

    fn base_delay(&self, failures: u32) -> Duration {
        let exponent = failures.min(64) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        use rand::Rng;

        if self.jitter_ratio <= 0.0 {
            return delay;
        }

        let spread = delay.as_secs_f64() * self.jitter_ratio;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
            multiplier: config.multiplier.max(1.0),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 0.99),
            max_attempts: config.max_attempts,
            circuit_breaker_threshold: config.circuit_breaker_threshold,
            circuit_breaker_cooldown: Duration::from_secs(config.circuit_breaker_cooldown_seconds),
        }
    }
}
