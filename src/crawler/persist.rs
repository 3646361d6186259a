//! Persistence stage
//!
//! Records are accumulated into a batch that is flushed when it reaches the
//! batch size, when it has been waiting longer than the flush interval, and
//! once more when the stage shuts down. A flush appends the batch to the
//! committed snapshot through the store's staging/commit protocol.
//!
//! All flushes of a run go through one mutex, so two flushes never read the
//! same snapshot and overwrite each other's records.

use crate::crawler::queue::{Dequeue, WorkQueue};
use crate::crawler::state::{CancelSignal, PipelineState, StageCounters};
use crate::model::Record;
use crate::storage::{SnapshotStore, StorageError};
use crate::HarvestError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Batching policy of the Persistence stage
#[derive(Debug, Clone)]
pub struct PersistSettings {
    /// Records accumulated before a size-triggered flush
    pub batch_size: usize,

    /// Maximum age of a non-empty batch before a time-triggered flush
    pub flush_interval: Duration,

    /// Consecutive failed flushes tolerated before the run is cancelled
    pub max_flush_failures: u32,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_secs(2),
            max_flush_failures: 3,
        }
    }
}

#[derive(Debug)]
struct BatchState {
    records: Vec<Record>,
    /// When the last flush was attempted (or the stage started)
    last_attempt: Instant,
    consecutive_failures: u32,
}

/// Shared batch plus the flush protocol around a [`SnapshotStore`]
pub struct BatchWriter<S: SnapshotStore> {
    store: Arc<S>,
    settings: PersistSettings,
    state: Mutex<BatchState>,
}

impl<S: SnapshotStore> BatchWriter<S> {
    pub fn new(store: Arc<S>, settings: PersistSettings) -> Self {
        Self {
            store,
            settings,
            state: Mutex::new(BatchState {
                records: Vec::new(),
                last_attempt: Instant::now(),
                consecutive_failures: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of records waiting for the next flush
    pub fn pending(&self) -> usize {
        self.lock().records.len()
    }

    /// Adds a record and flushes if the batch is full or the flush interval
    /// has elapsed
    ///
    /// Returns the number of records committed by this call.
    pub fn accept(&self, record: Record) -> Result<usize, HarvestError> {
        let mut state = self.lock();
        state.records.push(record);

        // After a failure, wait out the interval before retrying on size alone
        let time_due = state.last_attempt.elapsed() >= self.settings.flush_interval;
        let size_due =
            state.records.len() >= self.settings.batch_size && state.consecutive_failures == 0;
        if time_due || size_due {
            self.flush_tolerant(&mut state)
        } else {
            Ok(0)
        }
    }

    /// Flushes a non-empty batch that has waited longer than the flush interval
    pub fn flush_if_due(&self) -> Result<usize, HarvestError> {
        let mut state = self.lock();
        let time_due = !state.records.is_empty()
            && state.last_attempt.elapsed() >= self.settings.flush_interval;
        if time_due {
            self.flush_tolerant(&mut state)
        } else {
            Ok(0)
        }
    }

    /// Flushes whatever is left; any failure here is fatal
    pub fn final_flush(&self) -> Result<usize, HarvestError> {
        let mut state = self.lock();
        Self::flush_locked(&self.store, &mut state).map_err(HarvestError::Storage)
    }

    /// Flush that tolerates up to `max_flush_failures - 1` consecutive failures
    fn flush_tolerant(&self, state: &mut BatchState) -> Result<usize, HarvestError> {
        match Self::flush_locked(&self.store, state) {
            Ok(committed) => Ok(committed),
            Err(e) if state.consecutive_failures < self.settings.max_flush_failures => {
                tracing::warn!(
                    "Flush of {} records to {} failed ({}/{}), keeping batch: {}",
                    state.records.len(),
                    self.store.describe(),
                    state.consecutive_failures,
                    self.settings.max_flush_failures,
                    e
                );
                Ok(0)
            }
            Err(e) => Err(HarvestError::FlushExhausted {
                attempts: state.consecutive_failures,
                source: e,
            }),
        }
    }

    /// Load, append, stage, commit; the batch is only cleared after a commit
    fn flush_locked(store: &S, state: &mut BatchState) -> Result<usize, StorageError> {
        if state.records.is_empty() {
            return Ok(0);
        }
        state.last_attempt = Instant::now();

        let result = (|| -> Result<usize, StorageError> {
            let mut snapshot = store.load_snapshot()?;
            snapshot.append(state.records.iter().cloned());
            let staging = store.write_staging(&snapshot)?;
            store.commit_staging(staging)?;
            Ok(snapshot.len())
        })();

        match result {
            Ok(total) => {
                let committed = state.records.len();
                state.records.clear();
                state.consecutive_failures = 0;
                tracing::debug!(
                    "Committed {} records to {} ({} total)",
                    committed,
                    store.describe(),
                    total
                );
                Ok(committed)
            }
            Err(e) => {
                state.consecutive_failures += 1;
                Err(e)
            }
        }
    }
}

/// Persistence worker loop
///
/// Takes records until the record queue is closed and drained, flushing on
/// size and on time, then performs the final flush. A fatal flush error
/// cancels the run.
pub async fn persist_worker<S: SnapshotStore>(
    id: usize,
    records: Arc<WorkQueue<Record>>,
    writer: Arc<BatchWriter<S>>,
    state: Arc<PipelineState>,
    cancel: Arc<CancelSignal>,
    poll_interval: Duration,
) {
    tracing::debug!("Persistence worker {} started", id);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let outcome = match records.pop_timeout(poll_interval).await {
            Dequeue::Item(record) => writer.accept(record),
            Dequeue::Idle => writer.flush_if_due(),
            Dequeue::Closed => break,
        };

        match outcome {
            Ok(committed) => {
                StageCounters::add(&state.counters.records_persisted, committed as u64)
            }
            Err(e) => {
                cancel.cancel(e);
                break;
            }
        }
    }

    // Final flush also runs after cancellation so accepted records are not lost
    match writer.final_flush() {
        Ok(committed) => StageCounters::add(&state.counters.records_persisted, committed as u64),
        Err(e) => {
            cancel.cancel(e);
        }
    }

    tracing::debug!("Persistence worker {} finished", id);
}
