//! History backfill
//!
//! One-shot load of every normal and internal transaction the indexing API
//! knows for the watched address. The highest block seen becomes the
//! hand-off point to live tailing.

use crate::error::SourceError;
use crate::events::{ActivityBatch, WatchedAddress};
use crate::indexer::IndexingClient;
use crate::retry::{retry_source, RetryPolicy};
use tracing::info;

/// Merged history plus the block it ends at.
#[derive(Debug, Clone)]
pub struct Backfill {
    pub batch: ActivityBatch,
    /// Highest block in `batch`, 0 when there is no history.
    pub last_block: u64,
    /// Either list stopped at the indexer's result cap.
    pub truncated: bool,
}

/// Fetch `[0, latest]` history for `address`.
///
/// Both lists are retried independently under `retry`; if either one
/// ultimately fails the whole backfill fails, since half a history would
/// look complete to the reader.
pub async fn run_backfill<I>(
    indexer: &I,
    address: &WatchedAddress,
    retry: &RetryPolicy,
) -> Result<Backfill, SourceError>
where
    I: IndexingClient + ?Sized,
{
    info!(%address, "backfilling history");

    let (normal, internal) = tokio::join!(
        retry_source(retry, "backfill txlist", move || indexer.fetch_normal(address, None)),
        retry_source(retry, "backfill txlistinternal", move || {
            indexer.fetch_internal(address, None)
        }),
    );
    let normal = normal?;
    let internal = internal?;

    info!(
        normal = normal.events.len(),
        internal = internal.events.len(),
        "history fetched"
    );

    let truncated = normal.truncated || internal.truncated;
    let mut batch = normal.events;
    batch.extend(internal.events);
    batch.sort_chronologically();
    let last_block = batch.max_block().unwrap_or(0);

    Ok(Backfill {
        batch,
        last_block,
        truncated,
    })
}
