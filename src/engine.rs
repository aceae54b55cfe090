//! Reconciliation engine
//!
//! Runs the history backfill once, then tails new blocks until shutdown.
//! The cursor and dedup window built by the backfill are handed to the
//! tailer so the hand-off block is neither skipped nor emitted twice.
//!
//! State machine: `Backfilling -> Tailing -> Stopped`. There is no way back
//! to `Backfilling`.

use crate::backfill::run_backfill;
use crate::cache::RecentIdentities;
use crate::cursor::Cursor;
use crate::error::EngineError;
use crate::events::WatchedAddress;
use crate::head::ChainHeadSource;
use crate::indexer::IndexingClient;
use crate::report::{EngineStatus, Incident, Reporter};
use crate::retry::RetryPolicy;
use crate::sink::EventSink;
use crate::tailer::LiveTailer;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Tunables for one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Budget for each indexing API call and block fetch.
    pub retry: RetryPolicy,
    /// Budget for re-establishing the head subscription.
    pub reconnect: RetryPolicy,
    /// Number of recently emitted identities remembered for dedup.
    pub dedup_window: usize,
    /// Most blocks walked for a single head notification.
    pub max_catchup_blocks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            reconnect: RetryPolicy {
                max_attempts: 10,
                initial_backoff: std::time::Duration::from_secs(1),
                max_backoff: std::time::Duration::from_secs(60),
                multiplier: 2,
            },
            dedup_window: 10_000,
            max_catchup_blocks: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Backfilling,
    Tailing,
    Stopped,
}

/// Orchestrates backfill and tailing for one watched address.
pub struct Engine<I, H, S> {
    address: WatchedAddress,
    config: EngineConfig,
    indexer: I,
    head: H,
    sink: S,
    reporter: Reporter,
    state: EngineState,
}

impl<I, H, S> Engine<I, H, S>
where
    I: IndexingClient,
    H: ChainHeadSource,
    S: EventSink,
{
    pub fn new(address: WatchedAddress, config: &EngineConfig, indexer: I, head: H, sink: S) -> Self {
        Self {
            address,
            config: config.clone(),
            indexer,
            head,
            sink,
            reporter: Reporter::new(),
            state: EngineState::Backfilling,
        }
    }

    /// Status feed covering every incident the engine reports.
    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.reporter.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run until `shutdown` fires or the head subscription cannot be
    /// restored. Returns the final cursor on a clean stop.
    ///
    /// Shutdown is only observed between blocks, so a block that is being
    /// emitted always completes.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<Cursor, EngineError> {
        let mut cursor = Cursor::new();
        let mut seen = RecentIdentities::new(self.config.dedup_window);

        self.state = EngineState::Backfilling;
        let backfill = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = run_backfill(&self.indexer, &self.address, &self.config.retry) => Some(result),
        };
        let Some(backfill) = backfill else {
            return Ok(self.stop(cursor));
        };

        match backfill {
            Ok(history) => {
                info!(
                    events = history.batch.len(),
                    last_block = history.last_block,
                    "backfill complete"
                );
                if !history.batch.is_empty() {
                    self.sink.emit(&history.batch);
                    seen.remember(&history.batch);
                }
                cursor.advance(history.last_block);
                if history.truncated {
                    self.reporter.report(Incident::BackfillTruncated {
                        last_block: history.last_block,
                    });
                }
            }
            Err(error) => self.reporter.report(Incident::BackfillFailed { error }),
        }

        self.state = EngineState::Tailing;
        self.reporter.running();

        let mut tailer = LiveTailer::new(
            self.address,
            &self.indexer,
            &self.head,
            &self.sink,
            self.config.retry.clone(),
            self.config.max_catchup_blocks,
            cursor,
            seen,
        );

        let mut failures: u32 = 0;
        'session: loop {
            let subscribed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'session,
                result = self.head.subscribe() => result,
            };

            let lost = match subscribed {
                Ok(mut heads) => {
                    self.reporter.report(Incident::SubscriptionRestored);
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => break 'session,
                            next = heads.recv() => next,
                        };
                        match next {
                            Some(n) => {
                                failures = 0;
                                tailer.on_head(n, &mut self.reporter, &shutdown).await;
                            }
                            None => break "subscription closed".to_string(),
                        }
                    }
                }
                Err(error) => error.to_string(),
            };

            failures += 1;
            match self.config.reconnect.next_delay(failures) {
                Some(delay) => {
                    self.reporter.report(Incident::SubscriptionLost {
                        attempt: failures,
                        error: lost,
                    });
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break 'session,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    self.reporter.report(Incident::ReconnectExhausted { attempts: failures });
                    self.state = EngineState::Stopped;
                    return Err(EngineError::SubscriptionExhausted {
                        attempts: failures,
                        last: lost,
                    });
                }
            }
        }

        let cursor = tailer.cursor();
        Ok(self.stop(cursor))
    }

    fn stop(&mut self, cursor: Cursor) -> Cursor {
        self.reporter.report(Incident::Shutdown);
        self.state = EngineState::Stopped;
        info!(last_block = ?cursor.last_processed(), "engine stopped");
        cursor
    }
}
