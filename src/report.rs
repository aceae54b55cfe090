//! Operator-facing incident reporting
//!
//! Every failure the engine tolerates or dies from goes through
//! [`Reporter::report`], which logs it and updates the published
//! [`EngineStatus`]. Operators (or the binary) can watch the status to tell
//! "still running, degraded" apart from "stopped".

use crate::error::SourceError;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Coarse health published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Starting,
    Running,
    /// Monitoring continues but some activity may be missing.
    Degraded { reason: String },
    Stopped { reason: String },
}

/// Something that went wrong (or recovered) while the engine runs.
#[derive(Debug, Clone)]
pub enum Incident {
    /// History could not be loaded; tailing continues without it.
    BackfillFailed { error: SourceError },
    /// The indexer's result cap was hit; history after `last_block` is
    /// incomplete.
    BackfillTruncated { last_block: u64 },
    /// Internal transfers for one block are missing.
    InternalFetchFailed { block: u64, error: SourceError },
    /// Block body could not be read; the block is not emitted.
    BlockFailed { block: u64, error: SourceError },
    /// Block could not be found and was skipped for good.
    BlockSkipped { block: u64 },
    /// Head notification at or below the cursor.
    StaleHead { block: u64, cursor: u64 },
    /// Gap too large to fill; the oldest blocks in it were not processed.
    CatchupTruncated { from: u64, to: u64 },
    SubscriptionLost { attempt: u32, error: String },
    SubscriptionRestored,
    /// Terminal.
    ReconnectExhausted { attempts: u32 },
    Shutdown,
}

/// Single reporting path for the engine.
pub struct Reporter {
    status: watch::Sender<EngineStatus>,
    /// Why history is incomplete, if it is.
    history_gap: Option<String>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        let (status, _) = watch::channel(EngineStatus::Starting);
        Self {
            status,
            history_gap: None,
        }
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Mark the engine as live; stays degraded if history was lost.
    pub fn running(&self) {
        if let Some(reason) = &self.history_gap {
            self.set(EngineStatus::Degraded {
                reason: reason.clone(),
            });
        } else {
            self.set(EngineStatus::Running);
        }
    }

    pub fn report(&mut self, incident: Incident) {
        match incident {
            Incident::BackfillFailed { error } => {
                error!(%error, "backfill failed, continuing with live blocks only");
                self.history_gap = Some(format!("historical backfill failed: {error}"));
                self.running();
            }
            Incident::BackfillTruncated { last_block } => {
                error!(
                    last_block,
                    "indexer result cap reached, history after this block is incomplete"
                );
                self.history_gap = Some(format!("history truncated after block {last_block}"));
                self.running();
            }
            Incident::InternalFetchFailed { block, error } => {
                warn!(block, %error, "internal transactions unavailable for block, not retried");
            }
            Incident::BlockFailed { block, error } => {
                warn!(block, %error, "block not processed, will retry on next head");
            }
            Incident::BlockSkipped { block } => {
                warn!(block, "block not found, skipped");
            }
            Incident::StaleHead { block, cursor } => {
                warn!(block, cursor, "head at or below cursor, ignored");
            }
            Incident::CatchupTruncated { from, to } => {
                warn!(from, to, "catch-up window exceeded, blocks not processed");
            }
            Incident::SubscriptionLost { attempt, error } => {
                warn!(attempt, %error, "head subscription lost, reconnecting");
                self.set(EngineStatus::Degraded {
                    reason: format!("head subscription lost: {error}"),
                });
            }
            Incident::SubscriptionRestored => {
                info!("head subscription established");
                self.running();
            }
            Incident::ReconnectExhausted { attempts } => {
                error!(attempts, "head subscription could not be restored, stopping");
                self.set(EngineStatus::Stopped {
                    reason: format!("reconnect budget exhausted after {attempts} attempts"),
                });
            }
            Incident::Shutdown => {
                info!("shutdown requested");
                self.set(EngineStatus::Stopped {
                    reason: "shutdown requested".into(),
                });
            }
        }
    }

    fn set(&self, status: EngineStatus) {
        self.status.send_replace(status);
    }
}
