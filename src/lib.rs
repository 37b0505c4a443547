//! Durable Cache - an in-process key-value cache
//!
//! LRU eviction, per-key expiration and an append-only log that rebuilds the
//! cache after a restart.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheEngine;
pub use config::{Config, CorruptionPolicy};
pub use error::{CacheError, Result};
pub use tasks::spawn_sweeper;
