//! Recovery Loader
//!
//! Rebuilds a cache engine from the durable log before it serves traffic.
//! Records are re-applied in append order against a fresh index, without
//! being logged again. Records whose persisted deadline has already passed
//! are dropped rather than resurrected.

use std::path::Path;

use tracing::{info, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::index::EvictionIndex;
use crate::cache::CacheEngine;
use crate::config::{Config, CorruptionPolicy};
use crate::error::{CacheError, Result};
use crate::persistence::{DurableLog, LogRecord};

// == Replay Stats ==
/// Summary of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Well-formed records read from the log
    pub records_read: u64,
    /// SET records inserted into the index
    pub sets_applied: u64,
    /// DEL records applied
    pub deletes_applied: u64,
    /// SET records dropped because their deadline had passed
    pub expired_dropped: u64,
    /// Lines skipped under `CorruptionPolicy::Skip`
    pub corrupt_skipped: u64,
    /// Entries evicted because replay exceeded `max_entries`
    pub evictions: u64,
}

// == Replay ==
/// Applies every record of the log at `path` to `index`, judging expiry at `now`.
///
/// I/O errors always abort. Corrupt lines abort under `Strict` and are
/// skipped with a warning under `Skip`.
pub fn replay(
    path: &Path,
    index: &mut EvictionIndex,
    policy: CorruptionPolicy,
    now: u64,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for item in DurableLog::read_all(path)? {
        let record = match item {
            Ok(record) => record,
            Err(CacheError::CorruptRecord { line, reason }) => match policy {
                CorruptionPolicy::Strict => {
                    return Err(CacheError::CorruptRecord { line, reason });
                }
                CorruptionPolicy::Skip => {
                    warn!(line, %reason, "Skipping corrupt log record");
                    stats.corrupt_skipped += 1;
                    continue;
                }
            },
            Err(e) => return Err(e),
        };
        stats.records_read += 1;

        match record {
            LogRecord::Set {
                key,
                value,
                expires_at,
            } => {
                if expires_at.is_some_and(|at| now >= at) {
                    // A later SET supersedes whatever came before it, even when stale
                    index.remove(&key);
                    stats.expired_dropped += 1;
                } else {
                    let evicted = index.put(key, value, expires_at);
                    stats.evictions += evicted.len() as u64;
                    stats.sets_applied += 1;
                }
            }
            LogRecord::Del { key } => {
                index.remove(&key);
                stats.deletes_applied += 1;
            }
        }
    }

    Ok(stats)
}

// == Load ==
/// Replays `config.log_path` into a fresh index of `config.max_entries` and
/// returns an engine ready for live traffic, appending to the same log.
pub fn load(config: &Config) -> Result<(CacheEngine, ReplayStats)> {
    let mut index = EvictionIndex::new(config.max_entries);
    let stats = replay(
        &config.log_path,
        &mut index,
        config.corruption_policy,
        current_timestamp_ms(),
    )?;
    let log = DurableLog::open(&config.log_path)?;

    info!(
        path = %config.log_path.display(),
        records = stats.records_read,
        live = index.len(),
        expired = stats.expired_dropped,
        corrupt = stats.corrupt_skipped,
        evicted = stats.evictions,
        "Recovered cache from durable log"
    );

    Ok((CacheEngine::from_parts(index, log, config), stats))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const NOW: u64 = 1_000_000;

    fn write_log(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("cache.aof");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_replay_applies_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            "SET \"a\" \"1\"\nSET \"b\" \"2\"\nSET \"a\" \"3\"\nDEL \"b\"\n",
        );
        let mut index = EvictionIndex::new(10);

        let stats = replay(&path, &mut index, CorruptionPolicy::Strict, NOW).unwrap();

        assert_eq!(stats.records_read, 4);
        assert_eq!(stats.sets_applied, 3);
        assert_eq!(stats.deletes_applied, 1);
        assert_eq!(index.keys_by_recency(), vec!["a"]);
        assert_eq!(index.peek("a", NOW).unwrap().value, "3");
    }

    #[test]
    fn test_replay_drops_expired_records() {
        let dir = TempDir::new().unwrap();
        let contents = format!(
            "SET \"stale\" \"v\" {}\nSET \"fresh\" \"v\" {}\nSET \"edge\" \"v\" {}\n",
            NOW - 1,
            NOW + 1,
            NOW
        );
        let path = write_log(&dir, &contents);
        let mut index = EvictionIndex::new(10);

        let stats = replay(&path, &mut index, CorruptionPolicy::Strict, NOW).unwrap();

        assert_eq!(stats.expired_dropped, 2);
        assert_eq!(index.keys_by_recency(), vec!["fresh"]);
    }

    #[test]
    fn test_stale_overwrite_hides_older_value() {
        let dir = TempDir::new().unwrap();
        let contents = format!("SET \"k\" \"old\"\nSET \"k\" \"new\" {}\n", NOW - 10);
        let path = write_log(&dir, &contents);
        let mut index = EvictionIndex::new(10);

        replay(&path, &mut index, CorruptionPolicy::Strict, NOW).unwrap();

        assert!(index.is_empty());
    }

    #[test]
    fn test_replay_respects_capacity() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "SET \"a\" \"1\"\nSET \"b\" \"2\"\nSET \"c\" \"3\"\n");
        let mut index = EvictionIndex::new(2);

        let stats = replay(&path, &mut index, CorruptionPolicy::Strict, NOW).unwrap();

        assert_eq!(stats.evictions, 1);
        assert_eq!(index.keys_by_recency(), vec!["c", "b"]);
    }

    #[test]
    fn test_strict_policy_aborts() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "SET \"a\" \"1\"\nnonsense\nSET \"b\" \"2\"\n");
        let mut index = EvictionIndex::new(10);

        let result = replay(&path, &mut index, CorruptionPolicy::Strict, NOW);

        assert!(matches!(result, Err(CacheError::CorruptRecord { line: 2, .. })));
    }

    #[test]
    fn test_skip_policy_continues() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "SET \"a\" \"1\"\nnonsense\nSET \"b\" \"2\"\n");
        let mut index = EvictionIndex::new(10);

        let stats = replay(&path, &mut index, CorruptionPolicy::Skip, NOW).unwrap();

        assert_eq!(stats.corrupt_skipped, 1);
        assert_eq!(stats.records_read, 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_missing_log_is_empty_cache() {
        let dir = TempDir::new().unwrap();
        let mut index = EvictionIndex::new(10);

        let stats = replay(
            &dir.path().join("none.aof"),
            &mut index,
            CorruptionPolicy::Strict,
            NOW,
        )
        .unwrap();

        assert_eq!(stats, ReplayStats::default());
        assert!(index.is_empty());
    }

    #[test]
    fn test_replay_ignores_record_cut_before_expiry() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "SET \"k\" \"old\"\nSET \"k\" \"v\"");
        let mut index = EvictionIndex::new(10);

        let stats = replay(&path, &mut index, CorruptionPolicy::Skip, NOW).unwrap();

        assert_eq!(stats.corrupt_skipped, 1);
        assert_eq!(stats.sets_applied, 1);
        assert_eq!(index.peek("k", NOW).unwrap().value, "old");

        let mut index = EvictionIndex::new(10);
        let strict = replay(&path, &mut index, CorruptionPolicy::Strict, NOW);
        assert!(matches!(strict, Err(CacheError::CorruptRecord { line: 2, .. })));
    }

    #[tokio::test]
    async fn test_load_strict_leaves_log_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "SET \"a\" \"1\"\nSET \"b\" \"tor");
        let config = Config {
            corruption_policy: CorruptionPolicy::Strict,
            ..Config::with_log_path(&path)
        };

        assert!(load(&config).is_err());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "SET \"a\" \"1\"\nSET \"b\" \"tor"
        );
    }

    #[tokio::test]
    async fn test_load_returns_serving_engine() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "SET \"a\" \"1\"\n");

        let (engine, stats) = load(&Config::with_log_path(&path)).unwrap();
        assert_eq!(stats.sets_applied, 1);
        assert_eq!(engine.get("a").await, Some("1".to_string()));

        engine.set("b", "2", None).await.unwrap();
        engine.close().await.unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "SET \"a\" \"1\"\nSET \"b\" \"2\"\n"
        );
    }
}
