//! Eviction Index Module
//!
//! Hash index plus recency list giving O(1) lookup, promotion and
//! least-recently-used eviction. All operations are total; expiry is checked
//! against a caller-supplied `now` so the index itself never reads the clock.

use std::collections::HashMap;

use crate::cache::lru::{LruTracker, RecencyHandle};
use crate::cache::CacheEntry;

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    handle: RecencyHandle,
}

// == Lookup ==
/// Result of a promoting lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Live entry; it is now the most recently used
    Hit(String),
    /// Entry was present but expired and has been removed
    Expired,
    /// No entry for the key
    Miss,
}

// == Eviction Index ==
#[derive(Debug)]
pub struct EvictionIndex {
    entries: HashMap<String, Slot>,
    lru: LruTracker,
    max_size: usize,
}

impl EvictionIndex {
    // == Constructor ==
    /// Creates an empty index holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size.min(4096)),
            lru: LruTracker::with_capacity(max_size.min(4096)),
            max_size,
        }
    }

    // == Get ==
    /// Looks up `key`, promoting it to most recently used on a hit.
    ///
    /// An expired entry is removed on the spot and reported as `Expired`.
    pub fn get(&mut self, key: &str, now: u64) -> Lookup {
        let expired = match self.entries.get(key) {
            Some(slot) => slot.entry.is_expired_at(now),
            None => return Lookup::Miss,
        };

        if expired {
            self.remove(key);
            return Lookup::Expired;
        }

        match self.entries.get(key) {
            Some(slot) => {
                self.lru.touch(slot.handle);
                Lookup::Hit(slot.entry.value.clone())
            }
            None => Lookup::Miss,
        }
    }

    // == Peek ==
    /// Returns the live entry for `key` without changing recency.
    pub fn peek(&self, key: &str, now: u64) -> Option<&CacheEntry> {
        self.entries
            .get(key)
            .map(|slot| &slot.entry)
            .filter(|entry| !entry.is_expired_at(now))
    }

    // == Put ==
    /// Inserts or refreshes `key` as the most recently used entry.
    ///
    /// Returns the keys evicted to bring the index back within `max_size`,
    /// least recently used first.
    pub fn put(&mut self, key: String, value: String, expires_at: Option<u64>) -> Vec<String> {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.entry = CacheEntry::new(value, expires_at);
            self.lru.touch(slot.handle);
            return Vec::new();
        }

        let handle = self.lru.push_front(key.clone());
        self.entries.insert(
            key,
            Slot {
                entry: CacheEntry::new(value, expires_at),
                handle,
            },
        );

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_size {
            match self.lru.evict_oldest() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    evicted.push(oldest);
                }
                None => break,
            }
        }
        evicted
    }

    // == Remove ==
    /// Deletes `key` and its recency position; a no-op if absent.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.lru.remove(slot.handle);
                true
            }
            None => false,
        }
    }

    /// Removes `key` only if it is expired at `now`.
    ///
    /// Used by the sweeper, whose scan and removal happen under separate lock
    /// acquisitions; a key refreshed in between is left alone.
    pub fn remove_if_expired(&mut self, key: &str, now: u64) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(|slot| slot.entry.is_expired_at(now))
            .unwrap_or(false);
        expired && self.remove(key)
    }

    // == Scan Expired ==
    /// Returns every key whose deadline is at or before `now`.
    pub fn scan_expired(&self, now: u64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Incremental form of [`scan_expired`](EvictionIndex::scan_expired).
    ///
    /// Examines at most `limit` slots starting at `cursor` and returns the
    /// expired keys found there with the cursor for the next call, or `None`
    /// once the end of the slot range has been reached.
    pub fn scan_expired_from(
        &self,
        cursor: usize,
        limit: usize,
        now: u64,
    ) -> (Vec<String>, Option<usize>) {
        let end = cursor.saturating_add(limit.max(1));
        let expired = self
            .lru
            .keys_in_slots(cursor, end)
            .filter(|key| {
                self.entries
                    .get(*key)
                    .is_some_and(|slot| slot.entry.is_expired_at(now))
            })
            .map(str::to_string)
            .collect();
        let next = (end < self.lru.slot_count()).then_some(end);
        (expired, next)
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.lru.iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Panics unless the hash index and recency list describe the same keys.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.lru.debug_validate_invariants();
        assert_eq!(self.entries.len(), self.lru.len());
        assert!(self.entries.len() <= self.max_size);
        for (key, slot) in &self.entries {
            assert_eq!(self.lru.get(slot.handle), Some(key.as_str()));
        }
    }
}
