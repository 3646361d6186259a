//! In-process snapshot backend

use crate::storage::{Snapshot, SnapshotStore, StorageError, StorageResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Snapshot held in memory
///
/// Used when embedding the pipeline without durable output and by tests that
/// need to observe staging and commit calls.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    committed: Mutex<Snapshot>,
    staging_writes: AtomicUsize,
    commits: AtomicUsize,
}

/// Staged copy of a snapshot
#[derive(Debug)]
pub struct MemoryStaging {
    snapshot: Snapshot,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that starts from an already committed snapshot
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            committed: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Returns a copy of the committed snapshot
    pub fn snapshot(&self) -> Snapshot {
        match self.committed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of staging writes so far
    pub fn staging_writes(&self) -> usize {
        self.staging_writes.load(Ordering::SeqCst)
    }

    /// Number of successful commits so far
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    type Staging = MemoryStaging;

    fn load_snapshot(&self) -> StorageResult<Snapshot> {
        let guard = self
            .committed
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(guard.clone())
    }

    fn write_staging(&self, snapshot: &Snapshot) -> StorageResult<MemoryStaging> {
        self.staging_writes.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryStaging {
            snapshot: snapshot.clone(),
        })
    }

    fn commit_staging(&self, staging: MemoryStaging) -> StorageResult<()> {
        let mut guard = self
            .committed
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        *guard = staging.snapshot;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
