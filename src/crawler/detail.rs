//! Detail stage
//!
//! Resolves each item reference into a full record by fetching and parsing
//! its detail payload and merging it over what the listing already said.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::DetailParser;
use crate::crawler::queue::WorkQueue;
use crate::crawler::state::{CancelSignal, PipelineState, StageCounters};
use crate::model::{ItemReference, Record};
use crate::HarvestError;
use std::sync::Arc;

/// Everything a Detail worker needs
pub struct DetailContext {
    pub items: Arc<WorkQueue<ItemReference>>,
    pub records: Arc<WorkQueue<Record>>,
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn DetailParser>,
    pub state: Arc<PipelineState>,
    pub cancel: Arc<CancelSignal>,
}

/// Detail worker loop
pub async fn detail_worker(id: usize, ctx: Arc<DetailContext>) {
    tracing::debug!("Detail worker {} started", id);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let Some(item) = ctx.items.pop().await else {
            break;
        };

        let key = item.key.clone();
        match resolve_item(&ctx, item).await {
            Ok(record) => {
                if ctx.records.push(record).await.is_err() {
                    break;
                }
                StageCounters::incr(&ctx.state.counters.items_processed);
            }
            Err(e) => {
                StageCounters::incr(&ctx.state.counters.items_failed);
                if is_fatal(&e) {
                    ctx.cancel.cancel(e);
                } else {
                    tracing::warn!("Dropping item {}: {}", key, e);
                }
            }
        }
    }

    tracing::debug!("Detail worker {} finished", id);
}

async fn resolve_item(ctx: &DetailContext, item: ItemReference) -> Result<Record, HarvestError> {
    tracing::debug!("Fetching detail for item {} at {}", item.key, item.detail_url);

    let payload = ctx.fetcher.fetch(&item.detail_url).await?;
    let attributes = ctx.parser.parse_detail(&payload)?;
    Ok(Record::resolve(item, attributes))
}

fn is_fatal(error: &HarvestError) -> bool {
    matches!(error, HarvestError::Fetch(e) if e.is_fatal())
}
