//! Configuration for the batching engine.

use std::time::Duration;

/// Window settings for the [`BatchScheduler`](crate::BatchScheduler).
///
/// A window is sealed and dispatched when either:
/// - it holds `batch_size` tasks (size trigger)
/// - the repeating `interval` timer fires while it is non-empty (time trigger)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Period of the flush timer.
    pub interval: Duration,
    /// Maximum tasks per window before an immediate flush.
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            batch_size: 150,
        }
    }
}

/// Configuration for a [`BatchedEventsEngine`](crate::BatchedEventsEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Relays every batch subscription is opened against.
    pub relay_urls: Vec<String>,
    /// Window settings.
    pub batch: BatchConfig,
    /// Sampling period of the active subscription gauge.
    pub stats_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            relay_urls: Vec::new(),
            batch: BatchConfig::default(),
            stats_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_default() {
        let cfg = BatchConfig::default();
        assert_eq!(cfg.interval, Duration::from_millis(2000));
        assert_eq!(cfg.batch_size, 150);
    }

    #[test]
    fn test_engine_config_default() {
        let cfg = EngineConfig::default();
        assert!(cfg.relay_urls.is_empty());
        assert_eq!(cfg.batch, BatchConfig::default());
        assert_eq!(cfg.stats_interval, Duration::from_secs(1));
    }
}
