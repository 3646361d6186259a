//! Storage module for persisting harvested records
//!
//! This module handles durable snapshots of every committed record:
//! - The `Snapshot` value that readers query
//! - The staging/commit `SnapshotStore` contract
//! - A JSON file backend (temp file + rename)
//! - A SQLite backend (staging table + single-transaction swap)
//! - An in-process backend for embedding and tests

mod file;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use file::{FileStaging, JsonFileStore};
pub use memory::{MemorySnapshotStore, MemoryStaging};
pub use sqlite::{SqliteSnapshotStore, SqliteStaging};
pub use traits::{SnapshotStore, StorageError, StorageResult};

use crate::config::{OutputConfig, StorageBackend};
use crate::model::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Durable representation of all committed records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the last batch was committed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Records in commit order
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the most recently committed record with the given key
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.iter().rev().find(|record| record.key == key)
    }

    /// Returns true if any committed record has the given key
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Appends a batch and stamps the update time
    pub fn append<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = Record>,
    {
        self.records.extend(batch);
        self.updated_at = Some(Utc::now());
    }
}

/// Snapshot backend selected by configuration
pub enum AnyStore {
    Json(JsonFileStore),
    Sqlite(SqliteSnapshotStore),
}

/// Staging handle of an [`AnyStore`]
pub enum AnyStaging {
    Json(FileStaging),
    Sqlite(SqliteStaging),
}

impl SnapshotStore for AnyStore {
    type Staging = AnyStaging;

    fn load_snapshot(&self) -> StorageResult<Snapshot> {
        match self {
            Self::Json(store) => store.load_snapshot(),
            Self::Sqlite(store) => store.load_snapshot(),
        }
    }

    fn write_staging(&self, snapshot: &Snapshot) -> StorageResult<AnyStaging> {
        match self {
            Self::Json(store) => store.write_staging(snapshot).map(AnyStaging::Json),
            Self::Sqlite(store) => store.write_staging(snapshot).map(AnyStaging::Sqlite),
        }
    }

    fn commit_staging(&self, staging: AnyStaging) -> StorageResult<()> {
        match (self, staging) {
            (Self::Json(store), AnyStaging::Json(staging)) => store.commit_staging(staging),
            (Self::Sqlite(store), AnyStaging::Sqlite(staging)) => store.commit_staging(staging),
            _ => Err(StorageError::Unavailable(
                "staging handle belongs to a different backend".to_string(),
            )),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Json(store) => store.describe(),
            Self::Sqlite(store) => store.describe(),
        }
    }
}

/// Opens the snapshot backend named by the output configuration
pub fn open_store(config: &OutputConfig) -> StorageResult<AnyStore> {
    let path = Path::new(&config.snapshot_path);
    match config.backend {
        StorageBackend::Json => Ok(AnyStore::Json(JsonFileStore::new(path))),
        StorageBackend::Sqlite => Ok(AnyStore::Sqlite(SqliteSnapshotStore::open(path)?)),
    }
}
