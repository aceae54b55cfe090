//! Event sinks
//!
//! The engine hands every emitted [`ActivityBatch`] to an [`EventSink`] in
//! chronological order. Rendering is the sink's business; the engine makes
//! no assumption about it.

use crate::events::{format_ether, ActivityBatch, TransactionEvent};
use std::fmt::Write as _;
use std::sync::Mutex;
use tracing::info;

/// Receiver of emitted activity.
pub trait EventSink: Send + Sync {
    fn emit(&self, batch: &ActivityBatch);
}

/// Output format for [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One human-readable log line per event, values in ether.
    Text,
    /// One JSON object per event on stdout.
    JsonLines,
}

/// Default sink used by the binary.
pub struct LogSink {
    format: OutputFormat,
}

impl LogSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl EventSink for LogSink {
    fn emit(&self, batch: &ActivityBatch) {
        for event in batch.iter() {
            match self.format {
                OutputFormat::Text => info!("{}", describe(event)),
                OutputFormat::JsonLines => match serde_json::to_string(event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::error!(error = %e, "failed to serialize event"),
                },
            }
        }
    }
}

/// Sink that keeps everything in memory; used by tests and embedders.
#[derive(Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<ActivityBatch>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches received so far, in order.
    pub fn batches(&self) -> Vec<ActivityBatch> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// All events received so far, flattened.
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.batches().into_iter().flatten().collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, batch: &ActivityBatch) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(batch.clone());
        }
    }
}

/// Single-line description of an event.
pub fn describe(event: &TransactionEvent) -> String {
    let mut line = String::new();
    match event {
        TransactionEvent::Normal {
            hash,
            block_number,
            timestamp,
            from,
            to,
            value_wei,
            input_prefix,
        } => {
            let _ = write!(
                line,
                "[normal] block={block_number} ts={timestamp} tx={hash:?} from={from:?} to={} value={} ETH",
                fmt_to(to),
                format_ether(*value_wei),
            );
            if input_prefix != "0x" {
                let _ = write!(line, " method={input_prefix}");
            }
        }
        TransactionEvent::Internal {
            parent_hash,
            block_number,
            timestamp,
            from,
            to,
            value_wei,
            call_type,
            trace_id,
        } => {
            let _ = write!(
                line,
                "[internal] block={block_number} ts={timestamp} parent={parent_hash:?} from={from:?} to={} value={} ETH type={call_type}",
                fmt_to(to),
                format_ether(*value_wei),
            );
            if let Some(trace_id) = trace_id {
                let _ = write!(line, " trace={trace_id}");
            }
        }
    }
    line
}

fn fmt_to(to: &Option<alloy_primitives::Address>) -> String {
    match to {
        Some(addr) => format!("{addr:?}"),
        None => "(contract creation)".to_string(),
    }
}
