//! Persistence for patrol records.
//!
//! [`RecordStore`] is the seam the scan controller depends on. The shipped
//! implementation, [`HistoryStore`], keeps a capped, most-recent-first list
//! of records as one JSON document inside a [`KeyValueStore`], and pauses
//! before every save to stand in for the round trip to a remote database.
//!
//! The read-modify-write in [`HistoryStore::append`] is serialized within
//! one process only. Two processes sharing a database file can interleave
//! and lose a record.

pub mod kv;
pub mod migrations;
pub mod schema;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::record::PatrolRecord;

pub use kv::{KeyValueStore, MemoryKv, SqliteKv};

/// Key the history document is stored under.
pub const DEFAULT_HISTORY_KEY: &str = "ronda_history";

/// Number of records the history keeps.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Simulated remote round-trip applied to every save.
pub const DEFAULT_SIMULATED_LATENCY: Duration = Duration::from_millis(800);

/// Where patrol records go once a scan succeeds.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Persist a record and return it as stored (with its assigned id).
    ///
    /// # Errors
    ///
    /// Returns an error if the record is invalid or cannot be written.
    async fn append(&self, record: &PatrolRecord) -> Result<PatrolRecord>;

    /// The most recently stored record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored history cannot be read or parsed.
    async fn latest(&self) -> Result<Option<PatrolRecord>>;

    /// All retained records, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored history cannot be read or parsed.
    async fn history(&self) -> Result<Vec<PatrolRecord>>;
}

/// Tuning for a [`HistoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOptions {
    /// Key the history document lives under.
    pub key: String,
    /// Maximum number of records retained.
    pub capacity: usize,
    /// Delay applied before each save.
    pub latency: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            key: DEFAULT_HISTORY_KEY.to_string(),
            capacity: DEFAULT_HISTORY_CAPACITY,
            latency: DEFAULT_SIMULATED_LATENCY,
        }
    }
}

impl HistoryOptions {
    /// Options taken from the `[storage]` section of the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            key: config.storage.history_key.clone(),
            capacity: config.storage.history_capacity,
            latency: config.simulated_latency(),
        }
    }
}

/// Capped, most-recent-first record history over a key-value store.
#[derive(Debug)]
pub struct HistoryStore<K> {
    kv: K,
    options: HistoryOptions,
    write_lock: Mutex<()>,
}

impl<K: KeyValueStore> HistoryStore<K> {
    /// Create a history over `kv`.
    #[must_use]
    pub fn new(kv: K, options: HistoryOptions) -> Self {
        Self {
            kv,
            options,
            write_lock: Mutex::new(()),
        }
    }

    /// The options this store was built with.
    #[must_use]
    pub fn options(&self) -> &HistoryOptions {
        &self.options
    }

    /// Borrow the underlying key-value store.
    #[must_use]
    pub fn kv(&self) -> &K {
        &self.kv
    }

    fn read(&self) -> Result<Vec<PatrolRecord>> {
        match self.kv.get(&self.options.key)? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }
}

impl HistoryStore<SqliteKv> {
    /// Open the `SQLite` history described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: &Config) -> Result<Self> {
        let kv = SqliteKv::open(config.database_path())?;
        Ok(Self::new(kv, HistoryOptions::from_config(config)))
    }
}

#[async_trait]
impl<K: KeyValueStore> RecordStore for HistoryStore<K> {
    async fn append(&self, record: &PatrolRecord) -> Result<PatrolRecord> {
        record.validate()?;

        debug!(point_id = %record.point_id, "Sending record to store");
        tokio::time::sleep(self.options.latency).await;

        let _guard = self.write_lock.lock().await;

        let mut history = self.read()?;
        let stored = record.clone().with_id(Uuid::new_v4().simple().to_string());
        history.insert(0, stored.clone());
        history.truncate(self.options.capacity);

        let text = serde_json::to_string(&history)?;
        self.kv.set(&self.options.key, &text)?;

        info!(
            id = stored.id.as_deref().unwrap_or_default(),
            point_id = %stored.point_id,
            retained = history.len(),
            "Patrol record saved"
        );
        Ok(stored)
    }

    async fn latest(&self) -> Result<Option<PatrolRecord>> {
        Ok(self.read()?.into_iter().next())
    }

    async fn history(&self) -> Result<Vec<PatrolRecord>> {
        self.read()
    }
}
