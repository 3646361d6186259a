//! Storage traits and error types
//!
//! This module defines the staging/commit interface every snapshot backend
//! implements and the errors those backends report.

use crate::storage::Snapshot;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for snapshot backends
///
/// A flush goes through three calls:
///
/// 1. [`load_snapshot`](SnapshotStore::load_snapshot) reads the committed state
/// 2. [`write_staging`](SnapshotStore::write_staging) writes a full candidate
///    snapshot somewhere readers cannot see it
/// 3. [`commit_staging`](SnapshotStore::commit_staging) substitutes the candidate
///    for the committed snapshot in one step
///
/// Readers observe either the old snapshot or the new one, never a mix.
/// Dropping a `Staging` handle without committing it must discard the staged
/// artifact.
pub trait SnapshotStore: Send + Sync {
    /// Handle to a staged, not yet committed snapshot
    type Staging;

    /// Loads the committed snapshot (empty if nothing was committed yet)
    fn load_snapshot(&self) -> StorageResult<Snapshot>;

    /// Writes a complete candidate snapshot to the staging location
    fn write_staging(&self, snapshot: &Snapshot) -> StorageResult<Self::Staging>;

    /// Atomically replaces the committed snapshot with the staged one
    fn commit_staging(&self, staging: Self::Staging) -> StorageResult<()>;

    /// Human-readable location for log lines
    fn describe(&self) -> String;

    /// Replaces the committed snapshot with an empty one
    fn reset(&self) -> StorageResult<()> {
        let staging = self.write_staging(&Snapshot::default())?;
        self.commit_staging(staging)
    }
}
