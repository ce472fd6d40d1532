//! Bounded linear backoff for reconnecting after an unexpected disconnect

use std::time::Duration;

use rand::Rng;

/// Reconnect policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Attempts allowed before giving up
    pub max_attempts: u32,
    /// Delay unit in milliseconds; attempt `n` waits `n * base_delay_ms`
    pub base_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            jitter_factor: 0.0,
        }
    }
}

/// Counts reconnect attempts and hands out the delay for each one
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::with_config(ReconnectConfig::default())
    }

    pub fn with_config(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Register a new attempt and return how long to wait before it,
    /// or `None` once the attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        let base_delay = self.config.base_delay_ms as f64 * self.attempt as f64;

        // Apply jitter only if jitter_factor > 0
        let final_delay = if self.config.jitter_factor > 0.0 {
            let jitter_range = base_delay * self.config.jitter_factor.min(1.0);
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (base_delay + jitter).max(1.0) as u64
        } else {
            base_delay as u64
        };

        Some(Duration::from_millis(final_delay))
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_linearly() {
        let mut policy = ReconnectPolicy::new();

        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![1000, 2000, 3000, 4000, 5000]);
        assert_eq!(policy.attempt(), 5);
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut policy = ReconnectPolicy::new();
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.attempt(), 2);

        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut policy = ReconnectPolicy::with_config(ReconnectConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
            jitter_factor: 0.1,
        });

        let d1 = policy.next_delay().unwrap().as_millis();
        assert!((900..=1100).contains(&d1));
        let d2 = policy.next_delay().unwrap().as_millis();
        assert!((1800..=2200).contains(&d2));
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let mut policy = ReconnectPolicy::with_config(ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        });
        assert_eq!(policy.next_delay(), None);
    }
}
