//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and LRU eviction, backed by
//! the durable log.

mod engine;
pub mod entry;
pub mod index;
mod lru;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use engine::CacheEngine;
pub use entry::CacheEntry;
pub use index::{EvictionIndex, Lookup};
pub use lru::{LruTracker, RecencyHandle};
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
