//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Reaper: Removes expired cache entries at a fixed interval

mod reaper;

pub use reaper::Reaper;
