//! Cache Service Module
//!
//! Bundles the in-memory store, its reaper and the file cache behind one
//! owned handle that the host application constructs and passes around.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::{CacheStore, FileCache};
use crate::config::Config;
use crate::tasks::Reaper;

/// Owned cache stack: store + reaper + file cache.
#[derive(Debug)]
pub struct CacheService<V = serde_json::Value> {
    store: Arc<CacheStore<V>>,
    files: FileCache,
    reaper: Reaper,
}

impl<V> CacheService<V>
where
    V: Clone + Send + 'static,
{
    /// Builds the stack from configuration and starts the reaper.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn start(config: &Config) -> Self {
        Self::with_parts(
            config.default_ttl(),
            config.cleanup_interval(),
            FileCache::new(&config.cache_dir),
        )
    }

    /// Builds the stack from explicit parts and starts the reaper.
    pub fn with_parts(default_ttl: Duration, cleanup_interval: Duration, files: FileCache) -> Self {
        let store = Arc::new(CacheStore::new(default_ttl));
        let reaper = Reaper::spawn(store.clone(), cleanup_interval);
        info!(
            "Cache service started: default_ttl={:?}, cleanup_interval={:?}, dir={}",
            default_ttl,
            cleanup_interval,
            files.dir().display()
        );

        Self {
            store,
            files,
            reaper,
        }
    }

    /// Shared in-memory store; clone the `Arc` to hand it to other components.
    pub fn store(&self) -> &Arc<CacheStore<V>> {
        &self.store
    }

    pub fn files(&self) -> &FileCache {
        &self.files
    }

    /// Stops the reaper and waits for any running sweep to finish.
    pub async fn shutdown(self) {
        self.reaper.shutdown().await;
        let stats = self.store.stats();
        info!(
            "Cache service stopped: entries={}, hits={}, misses={}, hit_rate={:.1}%, expirations={}",
            stats.total_entries,
            stats.hits,
            stats.misses,
            stats.hit_rate() * 100.0,
            stats.expirations
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_service_round_trip() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            cache_dir: tmp.path().to_path_buf(),
            ..Config::default()
        };

        let service: CacheService<Value> = CacheService::start(&config);
        assert_eq!(service.store().default_ttl(), Duration::from_secs(3600));

        service.store().set("a", json!(1), None);
        assert_eq!(service.store().get("a"), Some(json!(1)));

        assert!(service.files().store("x", &json!({"a": 1})));
        assert_eq!(service.files().load::<Value>("x"), Some(json!({"a": 1})));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_service_reaps_in_background() {
        let tmp = TempDir::new().unwrap();
        let service: CacheService<String> = CacheService::with_parts(
            Duration::from_millis(50),
            Duration::from_millis(50),
            FileCache::new(tmp.path()),
        );

        service.store().set("short", "v".to_string(), None);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(service.store().is_empty());
        service.shutdown().await;
    }
}
