//! Cache Module
//!
//! In-memory TTL caching, durable file caching and function memoization.

mod entry;
mod file;
mod memoize;
mod service;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use file::{file_key, FileCache, FILE_CACHE_MAX_AGE};
pub use memoize::{derive_key, memoize, CallArgs, KeyArgs, Memoized};
pub use service::CacheService;
pub use stats::CacheStats;
pub use store::{Cache, CacheStore};
