//! Pipeline coordinator - run orchestration
//!
//! The coordinator wires the three stages together:
//! - Discovery workers walk the listing pages
//! - Detail workers resolve each listed item into a record
//! - Persistence workers batch records into the snapshot
//!
//! It owns the bounded queues between the stages, detects completion, and
//! shuts the stages down in order: once no page is in flight the Page queue
//! is closed and Discovery joined, then the Item queue is closed and Detail
//! joined, then the Record queue is closed and Persistence joined. The first
//! fatal error cancels every stage.

use crate::config::Config;
use crate::crawler::detail::{detail_worker, DetailContext};
use crate::crawler::discovery::{discovery_worker, DiscoveryContext};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::parser::{build_detail_parser, build_listing_parser, DetailParser, ListingParser};
use crate::crawler::persist::{persist_worker, BatchWriter, PersistSettings};
use crate::crawler::queue::WorkQueue;
use crate::crawler::state::{CancelSignal, PipelineState, StageCounters};
use crate::model::PageTask;
use crate::storage::{open_store, AnyStore, SnapshotStore};
use crate::HarvestError;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Sizing and batching of one run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub discovery_workers: usize,
    pub detail_workers: usize,
    pub persist_workers: usize,
    pub page_capacity: usize,
    pub item_capacity: usize,
    pub record_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub poll_interval: Duration,
    pub max_flush_failures: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            discovery_workers: 1,
            detail_workers: 4,
            persist_workers: 1,
            page_capacity: 16,
            item_capacity: 256,
            record_capacity: 256,
            batch_size: 50,
            flush_interval: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            max_flush_failures: 3,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            discovery_workers: config.pipeline.discovery_workers,
            detail_workers: config.pipeline.detail_workers,
            persist_workers: config.pipeline.persist_workers,
            page_capacity: config.queues.page_capacity,
            item_capacity: config.queues.item_capacity,
            record_capacity: config.queues.record_capacity,
            batch_size: config.pipeline.batch_size,
            flush_interval: Duration::from_millis(config.pipeline.flush_interval_ms),
            poll_interval: Duration::from_millis(config.pipeline.poll_interval_ms),
            max_flush_failures: config.pipeline.max_flush_failures,
        }
    }

    fn persist_settings(&self) -> PersistSettings {
        PersistSettings {
            batch_size: self.batch_size.max(1),
            flush_interval: self.flush_interval,
            max_flush_failures: self.max_flush_failures.max(1),
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every stage drained its input
    Completed,
    /// A fatal error stopped the run early
    CancelledFatal,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CancelledFatal => "cancelled (fatal)",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a run
#[derive(Debug)]
pub struct RunSummary {
    pub status: RunStatus,
    pub pages_processed: u64,
    pub pages_failed: u64,
    pub items_discovered: u64,
    /// Items resolved into records
    pub items_processed: u64,
    pub items_failed: u64,
    pub records_persisted: u64,
    pub elapsed: Duration,
    /// The error that cancelled the run
    pub error: Option<HarvestError>,
}

impl RunSummary {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// A configured three-stage harvest
///
/// Each pipeline owns one cancellation signal and is meant for a single run.
pub struct Pipeline<S: SnapshotStore + 'static> {
    fetcher: Arc<dyn Fetcher>,
    listing: Arc<dyn ListingParser>,
    detail: Arc<dyn DetailParser>,
    store: Arc<S>,
    settings: PipelineSettings,
    cancel: Arc<CancelSignal>,
}

impl<S: SnapshotStore + 'static> Pipeline<S> {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        listing: Arc<dyn ListingParser>,
        detail: Arc<dyn DetailParser>,
        store: Arc<S>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            listing,
            detail,
            store,
            settings,
            cancel: Arc::new(CancelSignal::new()),
        }
    }

    /// Handle for cancelling the run from outside (e.g. on Ctrl-C)
    pub fn cancel_signal(&self) -> Arc<CancelSignal> {
        Arc::clone(&self.cancel)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs the harvest from `seed` with the configured worker counts
    pub async fn run(&self, seed: PageTask) -> RunSummary {
        self.run_with_workers(
            seed,
            self.settings.discovery_workers,
            self.settings.detail_workers,
            self.settings.persist_workers,
        )
        .await
    }

    /// Runs the harvest from `seed` with explicit worker counts (minimum one each)
    pub async fn run_with_workers(
        &self,
        seed: PageTask,
        discovery_workers: usize,
        detail_workers: usize,
        persist_workers: usize,
    ) -> RunSummary {
        let started = Instant::now();
        let cancel = Arc::clone(&self.cancel);
        let state = Arc::new(PipelineState::new());

        let pages = Arc::new(WorkQueue::new(
            "page",
            self.settings.page_capacity,
            Arc::clone(&cancel),
        ));
        let items = Arc::new(WorkQueue::new(
            "item",
            self.settings.item_capacity,
            Arc::clone(&cancel),
        ));
        let records = Arc::new(WorkQueue::new(
            "record",
            self.settings.record_capacity,
            Arc::clone(&cancel),
        ));

        tracing::info!(
            "Starting harvest at {} ({} discovery, {} detail, {} persistence workers) into {}",
            seed,
            discovery_workers.max(1),
            detail_workers.max(1),
            persist_workers.max(1),
            self.store.describe()
        );

        // The seed counts as seen and in flight before any worker runs
        state.mark_seen(&seed);
        state.in_flight.begin();
        if pages.push(seed).await.is_err() {
            state.in_flight.finish();
        }

        let discovery_ctx = Arc::new(DiscoveryContext {
            pages: Arc::clone(&pages),
            items: Arc::clone(&items),
            fetcher: Arc::clone(&self.fetcher),
            parser: Arc::clone(&self.listing),
            state: Arc::clone(&state),
            cancel: Arc::clone(&cancel),
        });
        let mut discovery = JoinSet::new();
        for id in 0..discovery_workers.max(1) {
            discovery.spawn(discovery_worker(id, Arc::clone(&discovery_ctx)));
        }

        let detail_ctx = Arc::new(DetailContext {
            items: Arc::clone(&items),
            records: Arc::clone(&records),
            fetcher: Arc::clone(&self.fetcher),
            parser: Arc::clone(&self.detail),
            state: Arc::clone(&state),
            cancel: Arc::clone(&cancel),
        });
        let mut detail = JoinSet::new();
        for id in 0..detail_workers.max(1) {
            detail.spawn(detail_worker(id, Arc::clone(&detail_ctx)));
        }

        let writer = Arc::new(BatchWriter::new(
            Arc::clone(&self.store),
            self.settings.persist_settings(),
        ));
        let mut persistence = JoinSet::new();
        for id in 0..persist_workers.max(1) {
            persistence.spawn(persist_worker(
                id,
                Arc::clone(&records),
                Arc::clone(&writer),
                Arc::clone(&state),
                Arc::clone(&cancel),
                self.settings.poll_interval,
            ));
        }

        // Discovery workers only exit once the Page queue closes, so an early
        // exit here is a crashed worker that would otherwise stall completion
        tokio::select! {
            _ = state.in_flight.wait_drained() => {
                tracing::info!(
                    "Listing exhausted after {} pages",
                    state.pages_seen()
                );
            }
            _ = cancel.cancelled() => {
                tracing::info!("Run cancelled, shutting down stages");
            }
            Some(Err(e)) = discovery.join_next() => {
                cancel.cancel(HarvestError::Worker {
                    stage: "discovery",
                    message: e.to_string(),
                });
            }
        }

        pages.close();
        join_stage("discovery", &mut discovery, &cancel).await;

        items.close();
        join_stage("detail", &mut detail, &cancel).await;
        tracing::debug!(
            "Detail stage done: {} resolved, {} failed",
            StageCounters::get(&state.counters.items_processed),
            StageCounters::get(&state.counters.items_failed)
        );

        records.close();
        join_stage("persistence", &mut persistence, &cancel).await;

        let status = if cancel.is_cancelled() {
            RunStatus::CancelledFatal
        } else {
            RunStatus::Completed
        };

        let counters = &state.counters;
        let summary = RunSummary {
            status,
            pages_processed: StageCounters::get(&counters.pages_processed),
            pages_failed: StageCounters::get(&counters.pages_failed),
            items_discovered: StageCounters::get(&counters.items_discovered),
            items_processed: StageCounters::get(&counters.items_processed),
            items_failed: StageCounters::get(&counters.items_failed),
            records_persisted: StageCounters::get(&counters.records_persisted),
            elapsed: started.elapsed(),
            error: cancel.take_error(),
        };

        tracing::info!(
            "Harvest {} in {:.2?}: {} pages ({} failed), {} items ({} failed), {} records persisted",
            summary.status,
            summary.elapsed,
            summary.pages_processed,
            summary.pages_failed,
            summary.items_processed,
            summary.items_failed,
            summary.records_persisted
        );

        summary
    }
}

/// Waits for every worker of a stage; a crashed worker cancels the run
async fn join_stage(stage: &'static str, workers: &mut JoinSet<()>, cancel: &CancelSignal) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            cancel.cancel(HarvestError::Worker {
                stage,
                message: e.to_string(),
            });
        }
    }
    tracing::debug!("{} stage joined", stage);
}

/// Builds a pipeline with the HTTP fetcher, parsers and store named by the configuration
pub fn build_pipeline(config: &Config) -> Result<Pipeline<AnyStore>, HarvestError> {
    let fetcher = HttpFetcher::from_config(config)?;
    let listing = build_listing_parser(&config.listing)?;
    let detail = build_detail_parser(&config.detail)?;
    let store = open_store(&config.output)?;

    Ok(Pipeline::new(
        Arc::new(fetcher),
        listing,
        detail,
        Arc::new(store),
        PipelineSettings::from_config(config),
    ))
}
