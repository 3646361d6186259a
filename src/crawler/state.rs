//! Shared run state
//!
//! Everything the stage workers share while a run is in progress: the
//! first-fatal-error cancellation signal, the in-flight page counter used for
//! completion detection, the set of page links already seen, and the stage
//! counters that feed the run summary.

use crate::model::PageTask;
use crate::HarvestError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{watch, Notify};

/// Run-wide cancellation flag that remembers the first fatal error
///
/// Setting the flag is idempotent: the first caller's error is kept and
/// later errors are only logged.
#[derive(Debug)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    first_error: Mutex<Option<HarvestError>>,
    wake: watch::Sender<bool>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (wake, _) = watch::channel(false);
        Self {
            cancelled: AtomicBool::new(false),
            first_error: Mutex::new(None),
            wake,
        }
    }

    /// Cancels the run, returning true if this call was the one that did it
    pub fn cancel(&self, error: HarvestError) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::error!("Fatal error, cancelling run: {}", error);
            let mut slot = match self.first_error.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(error);
            drop(slot);
            self.wake.send_replace(true);
            true
        } else {
            tracing::debug!("Run already cancelled, dropping error: {}", error);
            false
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the run has been cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.wake.subscribe();
        // The sender lives in self, so wait_for only fails if self is gone
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Takes the error that cancelled the run
    pub fn take_error(&self) -> Option<HarvestError> {
        match self.first_error.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Number of page tasks created but not yet fully processed
///
/// A page counts from the moment it is admitted (before it is enqueued)
/// until the Discovery worker that consumed it has enqueued its successor and
/// its items. Zero therefore means no page work exists anywhere.
#[derive(Debug, Default)]
pub struct InFlight {
    pending: AtomicUsize,
    drained: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_one();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until no page is in flight
    pub async fn wait_drained(&self) {
        loop {
            // Register interest before checking, or a finish() in between is missed
            let notified = self.drained.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Per-stage progress counters
#[derive(Debug, Default)]
pub struct StageCounters {
    pub pages_processed: AtomicU64,
    pub pages_failed: AtomicU64,
    pub items_discovered: AtomicU64,
    pub items_processed: AtomicU64,
    pub items_failed: AtomicU64,
    pub records_persisted: AtomicU64,
}

impl StageCounters {
    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// State shared by every worker of one run
#[derive(Debug, Default)]
pub struct PipelineState {
    pub in_flight: InFlight,
    pub counters: StageCounters,
    seen_pages: Mutex<HashSet<String>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a page link, returning true the first time it is seen
    pub fn mark_seen(&self, page: &PageTask) -> bool {
        let key = page.key();
        let mut seen = match self.seen_pages.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.insert(key)
    }

    /// Number of distinct pages admitted so far
    pub fn pages_seen(&self) -> usize {
        match self.seen_pages.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
