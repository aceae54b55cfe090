//! Live tailing
//!
//! Turns head notifications into per-block activity batches. For each block
//! the body is scanned for normal transactions touching the watched address
//! while the indexing API is asked, concurrently, for that block's internal
//! transfers. Blocks are handled strictly in order, one at a time.

use crate::cache::RecentIdentities;
use crate::cursor::Cursor;
use crate::error::SourceError;
use crate::events::{ActivityBatch, TransactionEvent, WatchedAddress};
use crate::head::ChainHeadSource;
use crate::indexer::IndexingClient;
use crate::report::{Incident, Reporter};
use crate::retry::{retry_source, RetryPolicy};
use crate::sink::EventSink;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of processing one block whose body was read.
///
/// `internal` carries the isolated sub-failure: an error there never stops
/// the block from being emitted.
#[derive(Debug)]
pub struct BlockReport {
    pub block: u64,
    pub batch: ActivityBatch,
    pub internal: Result<usize, SourceError>,
}

/// Per-block processing state: the cursor and the dedup window.
pub struct LiveTailer<'a, I: ?Sized, H: ?Sized, S: ?Sized> {
    address: WatchedAddress,
    indexer: &'a I,
    head: &'a H,
    sink: &'a S,
    retry: RetryPolicy,
    max_catchup: u64,
    cursor: Cursor,
    seen: RecentIdentities,
    handoff_pending: bool,
}

impl<'a, I, H, S> LiveTailer<'a, I, H, S>
where
    I: IndexingClient + ?Sized,
    H: ChainHeadSource + ?Sized,
    S: EventSink + ?Sized,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: WatchedAddress,
        indexer: &'a I,
        head: &'a H,
        sink: &'a S,
        retry: RetryPolicy,
        max_catchup: u64,
        cursor: Cursor,
        seen: RecentIdentities,
    ) -> Self {
        Self {
            address,
            indexer,
            head,
            sink,
            retry,
            max_catchup: max_catchup.max(1),
            cursor,
            seen,
            handoff_pending: true,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Handle a head notification for block `n`.
    ///
    /// Every block between the cursor and `n` is processed in order. The
    /// first block whose body cannot be read stops the walk; the cursor stays
    /// on the last emitted block so the next notification retries from there.
    /// `shutdown` is checked before each block.
    pub async fn on_head(
        &mut self,
        n: u64,
        reporter: &mut Reporter,
        shutdown: &CancellationToken,
    ) {
        if let Some(current) = self.cursor.last_processed() {
            if n <= current {
                reporter.report(Incident::StaleHead { block: n, cursor: current });
                return;
            }
        }

        let mut start = self.cursor.next_block().unwrap_or(n);
        if n - start >= self.max_catchup {
            let window_start = n + 1 - self.max_catchup;
            if self.handoff_pending {
                // History up to the backfill point came from the indexer.
                info!(
                    history_until = start - 1,
                    tailing_from = window_start,
                    "hand-off beyond catch-up window, tailing from recent blocks"
                );
            } else {
                reporter.report(Incident::CatchupTruncated {
                    from: start,
                    to: window_start - 1,
                });
            }
            start = window_start;
        }
        self.handoff_pending = false;

        for block in start..=n {
            if shutdown.is_cancelled() {
                debug!(block, head = n, "shutdown requested, walk stopped");
                return;
            }
            match self.process_block(block).await {
                Ok(report) => {
                    if let Err(error) = report.internal.clone() {
                        reporter.report(Incident::InternalFetchFailed { block, error });
                    }
                    self.commit(report);
                }
                // A later head exists, so this block never will.
                Err(SourceError::BlockNotFound(_)) if block < n => {
                    reporter.report(Incident::BlockSkipped { block });
                    self.cursor.advance(block);
                }
                Err(error) => {
                    reporter.report(Incident::BlockFailed { block, error });
                    return;
                }
            }
        }
    }

    /// Fetch and filter one block without touching tailer state.
    pub async fn process_block(&self, number: u64) -> Result<BlockReport, SourceError> {
        let head = self.head;
        let indexer = self.indexer;
        let address = &self.address;

        let (block, internal) = tokio::join!(
            retry_source(&self.retry, "get block", move || head.get_block(number)),
            retry_source(&self.retry, "block txlistinternal", move || {
                indexer.fetch_internal(address, Some(number..=number))
            }),
        );
        let block = block?;

        let mut batch: ActivityBatch = block
            .transactions
            .iter()
            .filter(|tx| self.address.matches(tx.from, tx.to))
            .map(|tx| TransactionEvent::from_block_tx(&block, tx))
            .collect();

        let internal = internal.map(|listing| {
            let mut found = listing.events;
            found.retain(|e| e.block_number() == number);
            let count = found.len();
            batch.extend(found);
            count
        });

        debug!(
            block = number,
            txs = block.transactions.len(),
            matched = batch.len(),
            "block scanned"
        );

        Ok(BlockReport {
            block: number,
            batch,
            internal,
        })
    }

    /// Emit a processed block and move the cursor past it.
    fn commit(&mut self, report: BlockReport) {
        let mut batch = report.batch;
        let dropped = self.seen.filter_new(&mut batch);
        if dropped > 0 {
            debug!(block = report.block, dropped, "suppressed already-emitted events");
        }
        if !batch.is_empty() {
            info!(block = report.block, events = batch.len(), "activity");
            self.sink.emit(&batch);
            self.seen.remember(&batch);
        }
        self.cursor.advance(report.block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::sink::CollectingSink;
    use crate::test_utils::{block, internal_event, tx, watched, MockHeads, MockIndexer, OTHER, WATCHED};
    use alloy_primitives::Address;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            multiplier: 1,
        }
    }

    fn tailer<'a>(
        indexer: &'a MockIndexer,
        heads: &'a MockHeads,
        sink: &'a CollectingSink,
        cursor: Option<u64>,
    ) -> LiveTailer<'a, MockIndexer, MockHeads, CollectingSink> {
        let mut c = Cursor::new();
        if let Some(b) = cursor {
            c.advance(b);
        }
        LiveTailer::new(
            watched(),
            indexer,
            heads,
            sink,
            fast_retry(),
            16,
            c,
            RecentIdentities::new(100),
        )
    }

    #[tokio::test]
    async fn test_filters_block_case_insensitively() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        let stranger = Address::new([0x55; 20]);
        heads.add_block(block(
            11,
            vec![
                tx(1, WATCHED, Some(OTHER)),
                tx(2, stranger, Some(OTHER)),
                tx(3, OTHER, Some(WATCHED)),
                tx(4, stranger, None),
            ],
        ));
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));
        let mut reporter = Reporter::new();

        t.on_head(11, &mut reporter, &CancellationToken::new()).await;

        let hashes: Vec<_> = sink
            .events()
            .iter()
            .map(|e| match e {
                TransactionEvent::Normal { hash, .. } => hash[0],
                _ => panic!("unexpected internal event"),
            })
            .collect();
        assert_eq!(hashes, vec![1, 3]);
        assert_eq!(t.cursor().last_processed(), Some(11));
    }

    #[tokio::test]
    async fn test_internal_failure_isolated() {
        let indexer = MockIndexer::new();
        indexer.fail_internal_for_block(11);
        let heads = MockHeads::new(CancellationToken::new());
        heads.add_block(block(11, vec![tx(1, WATCHED, Some(OTHER))]));
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));
        let mut reporter = Reporter::new();

        t.on_head(11, &mut reporter, &CancellationToken::new()).await;

        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].kind(), EventKind::Normal);
        assert_eq!(t.cursor().last_processed(), Some(11));
        // Retried within budget, never again afterwards.
        assert_eq!(indexer.internal_calls(), 2);
    }

    #[tokio::test]
    async fn test_internal_events_follow_normal() {
        let indexer = MockIndexer::new();
        indexer.set_internal(vec![internal_event(11, 9), internal_event(12, 8)]);
        let heads = MockHeads::new(CancellationToken::new());
        heads.add_block(block(11, vec![tx(1, WATCHED, Some(OTHER))]));
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));

        t.on_head(11, &mut Reporter::new(), &CancellationToken::new()).await;

        let kinds: Vec<_> = sink.events().iter().map(TransactionEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::Normal, EventKind::Internal]);
    }

    #[tokio::test]
    async fn test_stale_and_repeated_heads_ignored() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        heads.add_block(block(11, vec![tx(1, WATCHED, Some(OTHER))]));
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));
        let mut reporter = Reporter::new();

        t.on_head(11, &mut reporter, &CancellationToken::new()).await;
        t.on_head(11, &mut reporter, &CancellationToken::new()).await;
        t.on_head(9, &mut reporter, &CancellationToken::new()).await;

        assert_eq!(sink.events().len(), 1);
        assert_eq!(t.cursor().last_processed(), Some(11));
    }

    #[tokio::test]
    async fn test_gap_filled_in_order() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        for n in 11..=13 {
            heads.add_block(block(n, vec![tx(n as u8, WATCHED, Some(OTHER))]));
        }
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));

        t.on_head(13, &mut Reporter::new(), &CancellationToken::new()).await;

        let blocks: Vec<_> = sink.events().iter().map(|e| e.block_number()).collect();
        assert_eq!(blocks, vec![11, 12, 13]);
        assert_eq!(sink.batches().len(), 3);
    }

    #[tokio::test]
    async fn test_unreadable_block_holds_cursor() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        heads.add_block(block(11, vec![tx(1, WATCHED, Some(OTHER))]));
        heads.add_block(block(12, vec![tx(2, WATCHED, Some(OTHER))]));
        heads.fail_block(11, vec![SourceError::Unavailable("node down".into()); 2]);
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));
        let mut reporter = Reporter::new();

        t.on_head(11, &mut reporter, &CancellationToken::new()).await;
        assert_eq!(t.cursor().last_processed(), Some(10));
        assert!(sink.events().is_empty());

        // Next head walks from 11 again.
        t.on_head(12, &mut reporter, &CancellationToken::new()).await;
        let blocks: Vec<_> = sink.events().iter().map(|e| e.block_number()).collect();
        assert_eq!(blocks, vec![11, 12]);
    }

    #[tokio::test]
    async fn test_missing_block_skipped_when_newer_head_exists() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        heads.add_block(block(12, vec![tx(2, WATCHED, Some(OTHER))]));
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));

        t.on_head(12, &mut Reporter::new(), &CancellationToken::new()).await;

        assert_eq!(t.cursor().last_processed(), Some(12));
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_handoff_beyond_window_starts_recent() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        for n in 85..=100 {
            heads.add_block(block(n, Vec::new()));
        }
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(3));

        t.on_head(100, &mut Reporter::new(), &CancellationToken::new()).await;

        // Window of 16 blocks ending at 100.
        assert_eq!(indexer.internal_calls(), 16);
        assert_eq!(t.cursor().last_processed(), Some(100));
    }

    #[tokio::test]
    async fn test_no_cursor_starts_at_first_head() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        heads.add_block(block(500, vec![tx(1, OTHER, Some(WATCHED))]));
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, None);

        t.on_head(500, &mut Reporter::new(), &CancellationToken::new()).await;

        assert_eq!(sink.events().len(), 1);
        assert_eq!(t.cursor().last_processed(), Some(500));
    }

    #[tokio::test]
    async fn test_already_emitted_events_suppressed() {
        let indexer = MockIndexer::new();
        indexer.set_internal(vec![internal_event(11, 9)]);
        let heads = MockHeads::new(CancellationToken::new());
        heads.add_block(block(11, vec![tx(1, WATCHED, Some(OTHER))]));
        let sink = CollectingSink::new();

        // The internal transfer was already delivered, e.g. by the backfill.
        let mut seen = RecentIdentities::new(100);
        seen.remember(&std::iter::once(internal_event(11, 9)).collect());
        let mut cursor = Cursor::new();
        cursor.advance(10);
        let mut t = LiveTailer::new(
            watched(),
            &indexer,
            &heads,
            &sink,
            fast_retry(),
            16,
            cursor,
            seen,
        );

        t.on_head(11, &mut Reporter::new(), &CancellationToken::new()).await;

        let kinds: Vec<_> = sink.events().iter().map(TransactionEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::Normal]);
    }

    #[tokio::test]
    async fn test_cancelled_walk_processes_nothing() {
        let indexer = MockIndexer::new();
        let heads = MockHeads::new(CancellationToken::new());
        for n in 11..=13 {
            heads.add_block(block(n, vec![tx(n as u8, WATCHED, Some(OTHER))]));
        }
        let sink = CollectingSink::new();
        let mut t = tailer(&indexer, &heads, &sink, Some(10));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        t.on_head(13, &mut Reporter::new(), &shutdown).await;

        assert!(sink.events().is_empty());
        assert_eq!(t.cursor().last_processed(), Some(10));
        assert_eq!(indexer.internal_calls(), 0);
    }
}
