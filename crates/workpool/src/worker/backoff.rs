//! Idle backoff between empty dequeues
//!
//! When every queue is empty a worker waits before scanning again, doubling
//! the wait up to a ceiling and resetting as soon as work is found. The wait
//! ends early when the worker's stop signal fires.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::serde_util::duration_millis;

/// Idle backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdleBackoffConfig {
    /// Wait after the first empty scan
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Longest wait between scans
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Growth factor applied after each empty scan
    pub multiplier: f64,
}

impl Default for IdleBackoffConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl IdleBackoffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum wait
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum wait
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set growth factor (at least 1.0)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }
}

/// Per-worker backoff state
#[derive(Debug)]
pub(crate) struct IdleBackoff {
    config: IdleBackoffConfig,
    current: Duration,
}

impl IdleBackoff {
    pub(crate) fn new(mut config: IdleBackoffConfig) -> Self {
        // NaN or a shrinking factor set directly on the field
        if config.multiplier.is_nan() || config.multiplier < 1.0 {
            config.multiplier = 1.0;
        }
        let current = config.min_interval.min(config.max_interval);
        Self { config, current }
    }

    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    /// Work was found: next idle wait starts from the minimum again
    pub(crate) fn reset(&mut self) {
        self.current = self.config.min_interval.min(self.config.max_interval);
    }

    /// Wait for the current interval, then grow it
    ///
    /// Returns `true` if the stop signal fired during the wait.
    pub(crate) async fn wait(&mut self, stop_rx: &mut watch::Receiver<bool>) -> bool {
        if *stop_rx.borrow() {
            return true;
        }

        let stopped = tokio::select! {
            _ = tokio::time::sleep(self.current) => false,
            // A closed channel means the worker handle is gone
            changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
        };

        self.increase();
        stopped
    }

    fn increase(&mut self) {
        // Non-finite or out-of-range products saturate at the ceiling
        let scaled = self.current.as_secs_f64() * self.config.multiplier;
        let next = Duration::try_from_secs_f64(scaled).unwrap_or(self.config.max_interval);
        self.current = next.min(self.config.max_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IdleBackoffConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(10));
        assert_eq!(config.max_interval, Duration::from_millis(500));
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn test_multiplier_floor() {
        let config = IdleBackoffConfig::new().with_multiplier(0.5);
        assert_eq!(config.multiplier, 1.0);
    }

    #[test]
    fn test_config_serializes_millis() {
        let config = IdleBackoffConfig::new().with_min_interval(Duration::from_millis(25));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["min_interval"], 25);
        assert_eq!(json["max_interval"], 500);
    }

    #[tokio::test]
    async fn test_grows_to_ceiling_and_resets() {
        let config = IdleBackoffConfig::new()
            .with_min_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(4));
        let mut backoff = IdleBackoff::new(config);
        let (_tx, mut rx) = watch::channel(false);

        assert!(!backoff.wait(&mut rx).await);
        assert_eq!(backoff.current(), Duration::from_millis(2));
        assert!(!backoff.wait(&mut rx).await);
        assert_eq!(backoff.current(), Duration::from_millis(4));
        assert!(!backoff.wait(&mut rx).await);
        assert_eq!(backoff.current(), Duration::from_millis(4));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(1));
    }

    #[test]
    fn test_infinite_multiplier_saturates_at_ceiling() {
        let config = IdleBackoffConfig {
            multiplier: f64::INFINITY,
            ..IdleBackoffConfig::new()
        };
        let mut backoff = IdleBackoff::new(config);

        backoff.increase();
        assert_eq!(backoff.current(), Duration::from_millis(500));
        backoff.increase();
        assert_eq!(backoff.current(), Duration::from_millis(500));
    }

    #[test]
    fn test_huge_multiplier_saturates_at_ceiling() {
        let config = IdleBackoffConfig::new()
            .with_max_interval(Duration::MAX)
            .with_multiplier(f64::MAX);
        let mut backoff = IdleBackoff::new(config);

        backoff.increase();
        backoff.increase();
        assert_eq!(backoff.current(), Duration::MAX);
    }

    #[test]
    fn test_nan_multiplier_keeps_interval() {
        let config = IdleBackoffConfig {
            multiplier: f64::NAN,
            ..IdleBackoffConfig::new()
        };
        let mut backoff = IdleBackoff::new(config);

        backoff.increase();
        assert_eq!(backoff.current(), Duration::from_millis(10));
    }

    #[test]
    fn test_deserialized_multiplier_below_one_is_floored() {
        let config: IdleBackoffConfig = serde_json::from_value(serde_json::json!({
            "min_interval": 8,
            "max_interval": 100,
            "multiplier": 0.25,
        }))
        .unwrap();
        let mut backoff = IdleBackoff::new(config);

        backoff.increase();
        assert_eq!(backoff.current(), Duration::from_millis(8));
    }

    #[tokio::test]
    async fn test_stop_signal_interrupts_wait() {
        let config = IdleBackoffConfig::new()
            .with_min_interval(Duration::from_secs(30))
            .with_max_interval(Duration::from_secs(30));
        let mut backoff = IdleBackoff::new(config);
        let (tx, mut rx) = watch::channel(false);

        let waiter = tokio::spawn(async move { backoff.wait(&mut rx).await });
        tx.send(true).unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("wait should end on stop")
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_already_stopped_returns_immediately() {
        let mut backoff = IdleBackoff::new(IdleBackoffConfig::default());
        let (_tx, mut rx) = watch::channel(true);
        assert!(backoff.wait(&mut rx).await);
    }
}
