//! Fetchcache - concurrent caching and resilient HTTP fetching
//!
//! Provides a TTL in-memory cache with a background reaper, a JSON file
//! cache, function memoization and an HTTP client with retry and backoff.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod tasks;
pub mod telemetry;

pub use cache::{memoize, Cache, CacheService, CacheStats, CacheStore, FileCache};
pub use config::Config;
pub use error::{HttpError, TransportError};
pub use http::{HttpClient, HttpConfig, RetryConfig};
pub use tasks::Reaper;
