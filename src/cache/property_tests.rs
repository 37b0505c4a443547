//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the index against a simple reference model and
//! the durable log against replay.

use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

use crate::cache::index::{EvictionIndex, Lookup};
use crate::cache::CacheEngine;
use crate::config::Config;
use crate::persistence::recovery::replay;
use crate::persistence::LogRecord;
use crate::CorruptionPolicy;

// == Test Configuration ==
const NOW: u64 = 1_000_000;

// == Strategies ==
/// Small key space so operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-h]".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,16}".prop_map(|s| s)
}

/// Arbitrary text, including quotes, whitespace and newlines
fn payload_strategy() -> impl Strategy<Value = String> {
    any::<String>()
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

// == Reference Model ==
/// Vec-backed LRU: front is least recently used.
#[derive(Debug, Default)]
struct ModelLru {
    order: Vec<(String, String)>,
    max_size: usize,
}

impl ModelLru {
    fn new(max_size: usize) -> Self {
        Self {
            order: Vec::new(),
            max_size,
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|(k, _)| k == key)
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let pos = self.position(key)?;
        let item = self.order.remove(pos);
        let value = item.1.clone();
        self.order.push(item);
        Some(value)
    }

    fn put(&mut self, key: String, value: String) -> Vec<String> {
        if let Some(pos) = self.position(&key) {
            self.order.remove(pos);
        }
        self.order.push((key, value));
        let mut evicted = Vec::new();
        while self.order.len() > self.max_size {
            evicted.push(self.order.remove(0).0);
        }
        evicted
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }

    fn keys_by_recency(&self) -> Vec<String> {
        self.order.iter().rev().map(|(k, _)| k.clone()).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Every operation agrees with the reference model, including which key
    // gets evicted, and the index never exceeds its capacity.
    #[test]
    fn prop_index_matches_reference_model(
        max_size in 1usize..6,
        ops in prop::collection::vec(cache_op_strategy(), 1..120)
    ) {
        let mut index = EvictionIndex::new(max_size);
        let mut model = ModelLru::new(max_size);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    let evicted = index.put(key.clone(), value.clone(), None);
                    prop_assert_eq!(evicted, model.put(key, value));
                }
                CacheOp::Get { key } => {
                    let expected = match model.get(&key) {
                        Some(value) => Lookup::Hit(value),
                        None => Lookup::Miss,
                    };
                    prop_assert_eq!(index.get(&key, NOW), expected);
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(index.remove(&key), model.remove(&key));
                }
            }

            prop_assert!(index.len() <= max_size);
            index.debug_validate_invariants();
        }

        prop_assert_eq!(index.keys_by_recency(), model.keys_by_recency());
    }

    // A key read just before `max_size` fresh inserts survives them all but the last.
    #[test]
    fn prop_get_promotes_to_most_recent(
        initial in prop::collection::hash_set("[a-z]{1,8}", 2..10),
        pick in any::<prop::sample::Index>()
    ) {
        let keys: Vec<String> = initial.into_iter().collect();
        let max_size = keys.len();
        let mut index = EvictionIndex::new(max_size);
        for key in &keys {
            index.put(key.clone(), "v".to_string(), None);
        }

        let promoted = keys[pick.index(keys.len())].clone();
        prop_assert!(matches!(index.get(&promoted, NOW), Lookup::Hit(_)));

        for i in 0..max_size - 1 {
            index.put(format!("fresh-{}", i), "v".to_string(), None);
            prop_assert!(index.peek(&promoted, NOW).is_some());
        }
        index.put("fresh-last".to_string(), "v".to_string(), None);
        prop_assert!(index.peek(&promoted, NOW).is_none());
    }

    // Entries are never reported expired before their deadline, always after.
    #[test]
    fn prop_scan_expired_respects_deadlines(
        deadlines in prop::collection::vec(prop::option::of(0u64..1_000), 1..40),
        now in 0u64..1_000,
        slice in 1usize..8
    ) {
        let mut index = EvictionIndex::new(deadlines.len());
        for (i, deadline) in deadlines.iter().enumerate() {
            index.put(format!("k{}", i), "v".to_string(), *deadline);
        }

        let expired = index.scan_expired(now);
        for (i, deadline) in deadlines.iter().enumerate() {
            let key = format!("k{}", i);
            let should_expire = deadline.map(|d| d <= now).unwrap_or(false);
            prop_assert_eq!(expired.contains(&key), should_expire);
            prop_assert_eq!(index.peek(&key, now).is_some(), !should_expire);
        }
        prop_assert_eq!(index.len(), deadlines.len());

        // Walking the slots in slices finds the same keys
        let mut sliced = Vec::new();
        let mut cursor = Some(0);
        while let Some(start) = cursor {
            let (found, next) = index.scan_expired_from(start, slice, now);
            sliced.extend(found);
            cursor = next;
        }
        let mut whole = expired;
        whole.sort();
        sliced.sort();
        prop_assert_eq!(sliced, whole);
    }

    // Any key/value text survives the line codec unchanged.
    #[test]
    fn prop_record_codec_preserves_payload(
        key in payload_strategy().prop_filter("non-empty", |k| !k.is_empty()),
        value in payload_strategy(),
        expires_at in prop::option::of(any::<u64>())
    ) {
        let record = LogRecord::Set { key, value, expires_at };
        let line = record.encode().unwrap();

        prop_assert_eq!(line.matches('\n').count(), 1);
        prop_assert_eq!(LogRecord::decode(&line).unwrap(), record);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Replaying an untouched log twice gives identical contents and order,
    // and matches the engine that wrote it when no reads reordered it.
    #[test]
    fn prop_replay_is_deterministic(
        max_size in 1usize..6,
        ops in prop::collection::vec(cache_op_strategy(), 1..60)
    ) {
        let dir = TempDir::new().unwrap();
        let config = Config {
            max_entries: max_size,
            ..Config::with_log_path(dir.path().join("cache.aof"))
        };

        let written = tokio_test::block_on(async {
            let engine = CacheEngine::open(&config).unwrap();
            for op in &ops {
                match op {
                    CacheOp::Set { key, value } => {
                        engine.set(key.clone(), value.clone(), None).await.unwrap();
                    }
                    CacheOp::Delete { key } => {
                        engine.delete(key).await.unwrap();
                    }
                    CacheOp::Get { .. } => {}
                }
            }
            let order = engine.keys_by_recency().await;
            engine.close().await.unwrap();
            order
        });

        let mut first = EvictionIndex::new(max_size);
        let mut second = EvictionIndex::new(max_size);
        replay(&config.log_path, &mut first, CorruptionPolicy::Strict, NOW).unwrap();
        replay(&config.log_path, &mut second, CorruptionPolicy::Strict, NOW).unwrap();

        let contents = |index: &EvictionIndex| -> HashMap<String, String> {
            index
                .keys_by_recency()
                .into_iter()
                .map(|k| {
                    let value = index.peek(&k, NOW).map(|e| e.value.clone()).unwrap_or_default();
                    (k, value)
                })
                .collect()
        };

        prop_assert_eq!(first.keys_by_recency(), second.keys_by_recency());
        prop_assert_eq!(contents(&first), contents(&second));
        prop_assert_eq!(first.keys_by_recency(), written);
    }
}

// Fewer cases: each one sleeps past a TTL
proptest! {
    #![proptest_config(ProptestConfig::with_cases(3))]

    // An entry with a TTL is a hit before it elapses and a miss afterwards,
    // both in the live engine and after recovery.
    #[test]
    fn prop_ttl_expiration_survives_restart(
        key in "[a-z]{1,12}",
        value in value_strategy()
    ) {
        let dir = TempDir::new().unwrap();
        let config = Config::with_log_path(dir.path().join("cache.aof"));

        tokio_test::block_on(async {
            let engine = CacheEngine::open(&config).unwrap();
            engine.set(key.clone(), value.clone(), Some(Duration::from_millis(150))).await.unwrap();
            engine.set("durable", "kept", None).await.unwrap();
            assert_eq!(engine.get(&key).await, Some(value.clone()));
            drop(engine);

            let recovered = CacheEngine::open(&config).unwrap();
            assert_eq!(recovered.get(&key).await, Some(value.clone()));
            drop(recovered);

            tokio::time::sleep(Duration::from_millis(250)).await;

            let recovered = CacheEngine::open(&config).unwrap();
            assert_eq!(recovered.get(&key).await, None);
            assert_eq!(recovered.get("durable").await, Some("kept".to_string()));
        });
    }
}
