//! Background Expiry Sweeper
//!
//! Lookups already treat expired keys as absent, so the sweeper is not
//! needed for correctness. It exists to reclaim memory held by keys that
//! expire and are never read again ("active expiry").
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for the current interval
//! 2. Removes every expired entry from the store
//! 3. Adjusts the interval: faster while many keys are expiring, slower
//!    while nothing is

use crate::storage::{PurgeStats, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// If this fraction of keys expired in one pass, speed up sweeping
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

impl ExpiryConfig {
    /// Default configuration around a different base interval.
    pub fn with_base_interval(base_interval: Duration) -> Self {
        let defaults = Self::default();
        Self {
            base_interval,
            min_interval: defaults.min_interval.min(base_interval),
            max_interval: defaults.max_interval.max(base_interval),
            ..defaults
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the sweeper as a background task on the current runtime.
    pub fn start(store: Arc<Store>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = config.base_interval.as_millis() as u64,
            "Background expiry sweeper started"
        );
        tokio::spawn(sweeper_loop(store, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Called automatically on drop.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            debug!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    store: Arc<Store>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    trace!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let PurgeStats { expired, remaining } = store.purge_expired();
        let scanned = expired + remaining;

        if expired == 0 {
            current_interval = (current_interval * 2).min(config.max_interval);
            continue;
        }

        let rate = expired as f64 / scanned as f64;
        if rate > config.speedup_threshold {
            current_interval = (current_interval / 2).max(config.min_interval);
        }

        debug!(
            expired,
            remaining,
            next_interval_ms = current_interval.as_millis() as u64,
            "Expired keys cleaned up"
        );
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(store: Arc<Store>) -> ExpirySweeper {
    ExpirySweeper::start(store, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_cleans_expired_keys() {
        let store = Arc::new(Store::new());

        for i in 0..10 {
            store
                .set(
                    Bytes::from(format!("key{}", i)),
                    Bytes::from("value"),
                    Some(Duration::from_millis(50)),
                )
                .unwrap();
        }
        store
            .set(Bytes::from("persistent"), Bytes::from("value"), None)
            .unwrap();

        let _sweeper = ExpirySweeper::start(
            Arc::clone(&store),
            ExpiryConfig::with_base_interval(Duration::from_millis(10)),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Removed physically, not by a lookup
        assert_eq!(store.expired_count(), 10);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(b"persistent"), Some(Bytes::from("value")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_drop() {
        let store = Arc::new(Store::new());

        {
            let _sweeper = start_expiry_sweeper(Arc::clone(&store));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        store
            .set(
                Bytes::from("key"),
                Bytes::from("value"),
                Some(Duration::from_millis(10)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.expired_count(), 0);

        // Lazy expiry still applies
        assert!(store.get(b"key").is_none());
        assert_eq!(store.expired_count(), 1);
    }

    #[test]
    fn test_config_with_base_interval() {
        let config = ExpiryConfig::with_base_interval(Duration::from_secs(5));
        assert_eq!(config.base_interval, Duration::from_secs(5));
        assert_eq!(config.max_interval, Duration::from_secs(5));
        assert_eq!(config.min_interval, Duration::from_millis(10));

        let config = ExpiryConfig::with_base_interval(Duration::from_millis(1));
        assert_eq!(config.min_interval, Duration::from_millis(1));
    }
}
