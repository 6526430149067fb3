//! Configuration for chessdb.
//!
//! Every tunable has a compile-time default that can be overridden by an
//! environment variable. Values that fail to parse fall back to the default.
//! Command-line flags override both (see `main.rs`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_DIR: &str = ".config/chessdb/data";
const DEV_DATA_DIR: &str = "./data";
const DATABASE_FILE: &str = "chessdb.sqlite";

const DEFAULT_DECODE_WORKERS: usize = 4;
const DEFAULT_WRITER_WORKERS: usize = 2;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 500;
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_PROGRESS_CAPACITY: usize = 64;

/// Get the data directory holding the database file.
///
/// Priority:
/// 1. `CHESSDB_DATA_DIR` env variable if set
/// 2. `$HOME/.config/chessdb/data` if HOME is set
/// 3. `./data` as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CHESSDB_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Default database path inside [`get_data_dir`].
pub fn get_database_path() -> PathBuf {
    get_data_dir().join(DATABASE_FILE)
}

/// Tunables of the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Number of tasks replaying games.
    pub decode_workers: usize,
    /// Number of tasks writing batches to the store.
    pub writer_workers: usize,
    /// Games per batch transaction.
    pub batch_size: usize,
    /// A non-empty batch is flushed at least this often.
    pub flush_interval: Duration,
    /// Capacity of the input and decoded-game queues.
    pub queue_capacity: usize,
    /// Capacity of the progress channel. Snapshots beyond it are dropped.
    pub progress_capacity: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            decode_workers: DEFAULT_DECODE_WORKERS,
            writer_workers: DEFAULT_WRITER_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

impl ImportConfig {
    /// Defaults overridden by the `CHESSDB_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            decode_workers: parse_or(
                lookup("CHESSDB_DECODE_WORKERS"),
                defaults.decode_workers,
            ),
            writer_workers: parse_or(
                lookup("CHESSDB_WRITER_WORKERS"),
                defaults.writer_workers,
            ),
            batch_size: parse_or(lookup("CHESSDB_BATCH_SIZE"), defaults.batch_size),
            flush_interval: Duration::from_millis(parse_or(
                lookup("CHESSDB_FLUSH_INTERVAL_MS"),
                DEFAULT_FLUSH_INTERVAL_MS,
            )),
            queue_capacity: parse_or(lookup("CHESSDB_QUEUE_CAPACITY"), defaults.queue_capacity),
            progress_capacity: defaults.progress_capacity,
        }
    }

    /// Clamp every value to its smallest usable setting: zero-sized pools,
    /// queues or intervals would stall or panic the pipeline.
    pub fn normalized(mut self) -> Self {
        self.decode_workers = self.decode_workers.max(1);
        self.writer_workers = self.writer_workers.max(1);
        self.batch_size = self.batch_size.max(1);
        self.flush_interval = self.flush_interval.max(Duration::from_millis(1));
        self.queue_capacity = self.queue_capacity.max(1);
        self.progress_capacity = self.progress_capacity.max(1);
        self
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_get_data_dir_fallback() {
        let dir = get_data_dir();
        match std::env::var("CHESSDB_DATA_DIR") {
            Ok(val) => assert_eq!(dir, PathBuf::from(val)),
            Err(_) => assert!(!dir.as_os_str().is_empty()),
        }
        assert!(get_database_path().ends_with(DATABASE_FILE));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CHESSDB_DECODE_WORKERS", "8"),
            ("CHESSDB_BATCH_SIZE", "25"),
            ("CHESSDB_FLUSH_INTERVAL_MS", "50"),
        ]
        .into_iter()
        .collect();
        let config = ImportConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.decode_workers, 8);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.flush_interval, Duration::from_millis(50));
        assert_eq!(config.writer_workers, DEFAULT_WRITER_WORKERS);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = ImportConfig::from_lookup(|name| match name {
            "CHESSDB_WRITER_WORKERS" => Some("many".to_string()),
            "CHESSDB_QUEUE_CAPACITY" => Some("-3".to_string()),
            _ => None,
        });
        assert_eq!(config, ImportConfig::default());
    }

    #[test]
    fn test_normalized_clamps_zero() {
        let config = ImportConfig {
            decode_workers: 0,
            writer_workers: 0,
            batch_size: 0,
            flush_interval: Duration::ZERO,
            queue_capacity: 0,
            progress_capacity: 0,
        }
        .normalized();
        assert_eq!(config.decode_workers, 1);
        assert_eq!(config.writer_workers, 1);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.flush_interval, Duration::from_millis(1));
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.progress_capacity, 1);
    }
}
