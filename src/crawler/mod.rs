//! Harvest pipeline
//!
//! This module contains the three-stage pipeline, including:
//! - HTTP fetching with retry logic
//! - Listing and detail payload parsing
//! - Bounded queues, cancellation and completion tracking
//! - Batched persistence through the snapshot store
//! - Overall run coordination

mod coordinator;
mod detail;
mod discovery;
mod fetcher;
mod parser;
mod persist;
mod queue;
mod state;

pub use coordinator::{build_pipeline, Pipeline, PipelineSettings, RunStatus, RunSummary};
pub use fetcher::{build_http_client, FetchError, Fetcher, HttpFetcher};
pub use parser::{
    build_detail_parser, build_listing_parser, DetailParser, HtmlDetailParser, HtmlListingParser,
    JsonDetailParser, JsonListingParser, ListingPage, ListingParser, ParseError,
};
pub use persist::{BatchWriter, PersistSettings};
pub use queue::{Dequeue, QueueClosed, WorkQueue};
pub use state::CancelSignal;
