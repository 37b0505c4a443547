//! Cache Engine Module
//!
//! Public API over the eviction index and the durable log. Every operation
//! runs under one exclusive lock; mutations are appended to the log before
//! they touch memory, so in-memory state is always something replay can
//! rebuild.
//!
//! The append (write + fsync) happens while the lock is held. A slow disk
//! therefore stalls every caller, readers included, for the duration of the
//! sync: durability and a single global order are bought with throughput.
//! The expiration sweep walks the index in bounded slices and releases the
//! lock between them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::entry::{current_timestamp_ms, deadline_from_ttl};
use crate::cache::index::{EvictionIndex, Lookup};
use crate::cache::{CacheStats, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::persistence::{recovery, DurableLog, LogRecord};
use crate::tasks::spawn_sweeper;

#[derive(Debug)]
struct EngineState {
    index: EvictionIndex,
    /// None once the engine has been closed
    log: Option<DurableLog>,
    stats: CacheStats,
}

// == Cache Engine ==
/// Durable LRU cache with per-key expiration.
///
/// Built by [`recovery::load`] (or [`CacheEngine::open`]) and shared behind an
/// `Arc` by its owner. Lifecycle: load, serve, [`close`](CacheEngine::close).
#[derive(Debug)]
pub struct CacheEngine {
    state: Mutex<EngineState>,
    default_ttl: Option<Duration>,
    sweep_batch_size: usize,
    shutdown: watch::Sender<bool>,
}

impl CacheEngine {
    // == Constructor ==
    /// Assembles an engine from an already replayed index and an open log.
    pub(crate) fn from_parts(index: EvictionIndex, log: DurableLog, config: &Config) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut stats = CacheStats::new();
        stats.set_total_entries(index.len());
        Self {
            state: Mutex::new(EngineState {
                index,
                log: Some(log),
                stats,
            }),
            default_ttl: config.default_ttl,
            sweep_batch_size: config.sweep_batch_size.max(1),
            shutdown,
        }
    }

    /// Recovers an engine from the log at `config.log_path`.
    pub fn open(config: &Config) -> Result<Self> {
        recovery::load(config).map(|(engine, _)| engine)
    }

    // == Set ==
    /// Stores `value` under `key`.
    ///
    /// `ttl` of `None` applies the configured default; `Some(Duration::ZERO)`
    /// stores the entry without expiry. If the log append fails the cache is
    /// left untouched and the I/O error is returned.
    pub async fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = key.into();
        let value = value.into();
        validate_key(&key)?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(CacheError::InvalidRequest(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }

        let mut state = self.state.lock().await;
        let now = current_timestamp_ms();
        let expires_at = deadline_from_ttl(now, ttl.or(self.default_ttl));
        let record = LogRecord::Set {
            key,
            value,
            expires_at,
        };

        // No await between append and apply: a caller that gives up on this
        // future can only do so before the record is written.
        state.log.as_mut().ok_or(CacheError::Closed)?.append(&record)?;
        state.stats.record_append();

        if let LogRecord::Set { key, value, .. } = record {
            let evicted = state.index.put(key, value, expires_at);
            if !evicted.is_empty() {
                debug!(?evicted, "LRU eviction");
                state.stats.record_evictions(evicted.len());
            }
        }
        let len = state.index.len();
        state.stats.set_total_entries(len);
        Ok(())
    }

    // == Get ==
    /// Returns the live value for `key`, promoting it to most recently used.
    ///
    /// Reads are not logged. An expired entry is dropped and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let lookup = state.index.get(key, current_timestamp_ms());
        match lookup {
            Lookup::Hit(value) => {
                state.stats.record_hit();
                Some(value)
            }
            Lookup::Expired => {
                state.stats.record_miss();
                state.stats.record_expirations(1);
                let len = state.index.len();
                state.stats.set_total_entries(len);
                None
            }
            Lookup::Miss => {
                state.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes `key`, returning whether a live entry existed.
    ///
    /// A `DEL` record is appended even when the key is not in memory, so a key
    /// that was evicted here cannot come back when the log is replayed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;

        let mut state = self.state.lock().await;
        let now = current_timestamp_ms();
        let record = LogRecord::Del {
            key: key.to_string(),
        };
        state.log.as_mut().ok_or(CacheError::Closed)?.append(&record)?;
        state.stats.record_append();

        let live = state.index.peek(key, now).is_some();
        state.index.remove(key);
        let len = state.index.len();
        state.stats.set_total_entries(len);
        Ok(live)
    }

    /// Checks for a live entry without touching recency or stats.
    pub async fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().await;
        state.index.peek(key, current_timestamp_ms()).is_some()
    }

    /// Number of entries held in memory, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.state.lock().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.index.is_empty()
    }

    /// Keys from most to least recently used.
    pub async fn keys_by_recency(&self) -> Vec<String> {
        self.state.lock().await.index.keys_by_recency()
    }

    // == Stats ==
    /// Returns a snapshot of the engine statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.index.len());
        stats
    }

    // == Sweep ==
    /// Removes every expired entry, walking the index `batch_size` slots per
    /// lock acquisition.
    ///
    /// Each acquisition both scans and removes, so the lock is never held for
    /// a pass over the whole cache. Keys inserted into already visited slots
    /// during the walk are left for the next sweep. Nothing is logged.
    pub async fn sweep_expired(&self, batch_size: usize) -> usize {
        let batch_size = batch_size.max(1);
        let mut cursor = Some(0);
        let mut removed = 0;

        while let Some(start) = cursor {
            {
                let mut state = self.state.lock().await;
                let now = current_timestamp_ms();
                let (expired, next) = state.index.scan_expired_from(start, batch_size, now);
                let count = expired
                    .iter()
                    .filter(|key| state.index.remove_if_expired(key, now))
                    .count();
                if count > 0 {
                    state.stats.record_expirations(count);
                    let len = state.index.len();
                    state.stats.set_total_entries(len);
                }
                removed += count;
                cursor = next;
            }
            tokio::task::yield_now().await;
        }
        removed
    }

    /// Starts the background sweeper, running every `interval` until [`close`](CacheEngine::close).
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        spawn_sweeper(Arc::clone(self), interval, self.sweep_batch_size)
    }

    /// Receiver that flips to `true` when the engine is closed.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    // == Close ==
    /// Syncs and releases the log, and stops the sweeper.
    ///
    /// Later `set`/`delete` calls fail with `Closed`; `get` keeps serving what
    /// is in memory. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let log = {
            let mut state = self.state.lock().await;
            state.log.take()
        };
        self.shutdown.send_replace(true);

        if let Some(log) = log {
            let path = log.path().display().to_string();
            log.close()?;
            info!(path = %path, "Cache engine closed");
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
