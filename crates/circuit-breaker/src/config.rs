//! Breaker tuning knobs.

use std::time::Duration;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive executed-call failures that trip the breaker open.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the consecutive-failure threshold. A zero threshold would trip
    /// before any failure, so the value is clamped to 1.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets how long the breaker stays open before probing.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.open_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_overrides() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_open_timeout(Duration::from_millis(250));
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.open_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let config = CircuitBreakerConfig::new().with_failure_threshold(0);
        assert_eq!(config.failure_threshold, 1);
    }
}
