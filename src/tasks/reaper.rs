//! TTL Reaper Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;

/// Handle to a running reaper task.
///
/// Call [`Reaper::shutdown`] to stop the task and wait until any sweep in
/// progress has released the store lock. Dropping the handle also stops the
/// loop at its next wake-up, without waiting for it.
#[derive(Debug)]
pub struct Reaper {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reaper {
    /// Spawns a reaper that sweeps `cache` immediately and then every
    /// `interval`.
    ///
    /// Each reaper owns its own stop channel, so several isolated instances
    /// can run side by side (e.g. in tests).
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    ///
    /// # Example
    /// ```ignore
    /// let cache = Arc::new(CacheStore::<Value>::new(Duration::from_secs(3600)));
    /// let reaper = Reaper::spawn(cache.clone(), Duration::from_secs(300));
    /// // Later, during shutdown:
    /// reaper.shutdown().await;
    /// ```
    pub fn spawn<V>(cache: Arc<CacheStore<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Starting TTL reaper with interval of {:?}", interval);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    changed = stop_rx.changed() => {
                        // Err means every sender is gone
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = cache.cleanup_expired();
                        if removed > 0 {
                            info!("TTL reaper: removed {} expired entries", removed);
                        } else {
                            debug!("TTL reaper: no expired entries found");
                        }
                    }
                }
            }

            info!("TTL reaper stopped");
        });

        Self { stop_tx, handle }
    }

    /// Signals the task to stop without waiting for it.
    pub fn stop(&self) {
        // Fails only when the task already exited
        let _ = self.stop_tx.send(true);
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(err) = self.handle.await {
            warn!("TTL reaper ended abnormally: {}", err);
        }
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
