//! Discovery stage
//!
//! Walks the paginated listing: each page task is fetched and parsed, its
//! items go to the Item queue and its "next" link, if not seen before in this
//! run, goes back to the Page queue.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::ListingParser;
use crate::crawler::queue::WorkQueue;
use crate::crawler::state::{CancelSignal, PipelineState, StageCounters};
use crate::model::{ItemReference, PageTask};
use crate::HarvestError;
use std::sync::Arc;

/// Everything a Discovery worker needs
pub struct DiscoveryContext {
    pub pages: Arc<WorkQueue<PageTask>>,
    pub items: Arc<WorkQueue<ItemReference>>,
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn ListingParser>,
    pub state: Arc<PipelineState>,
    pub cancel: Arc<CancelSignal>,
}

/// Discovery worker loop
pub async fn discovery_worker(id: usize, ctx: Arc<DiscoveryContext>) {
    tracing::debug!("Discovery worker {} started", id);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let Some(page) = ctx.pages.pop().await else {
            break;
        };

        process_page(&ctx, &page).await;
        ctx.state.in_flight.finish();
    }

    tracing::debug!("Discovery worker {} finished", id);
}

async fn process_page(ctx: &DiscoveryContext, page: &PageTask) {
    tracing::debug!("Fetching listing page {}", page);

    let payload = match ctx.fetcher.fetch(page.url()).await {
        Ok(payload) => payload,
        Err(e) if e.is_fatal() => {
            StageCounters::incr(&ctx.state.counters.pages_failed);
            ctx.cancel.cancel(HarvestError::Fetch(e));
            return;
        }
        Err(e) => {
            tracing::warn!("Dropping listing page {}: {}", page, e);
            StageCounters::incr(&ctx.state.counters.pages_failed);
            return;
        }
    };

    let listing = match ctx.parser.parse_listing(page.url(), &payload) {
        Ok(listing) => listing,
        Err(e) => {
            tracing::warn!("Dropping listing page {}: {}", page, e);
            StageCounters::incr(&ctx.state.counters.pages_failed);
            return;
        }
    };

    StageCounters::incr(&ctx.state.counters.pages_processed);
    if listing.skipped > 0 {
        tracing::warn!(
            "Skipped {} malformed entries on listing page {}",
            listing.skipped,
            page
        );
    }
    tracing::debug!(
        "Listing page {} yielded {} items, next: {}",
        page,
        listing.items.len(),
        listing
            .next
            .as_ref()
            .map(|next| next.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    // Successor first, so it counts as in flight before this page finishes
    if let Some(next) = listing.next {
        if ctx.state.mark_seen(&next) {
            ctx.state.in_flight.begin();
            if ctx.pages.push(next).await.is_err() {
                ctx.state.in_flight.finish();
                return;
            }
        } else {
            tracing::debug!("Next link {} already seen, ending traversal", next);
        }
    }

    for item in listing.items {
        StageCounters::incr(&ctx.state.counters.items_discovered);
        if ctx.items.push(item).await.is_err() {
            return;
        }
    }
}
