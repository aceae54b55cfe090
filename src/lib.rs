//! addrwatch - address activity reconciliation
//!
//! Loads the full transaction history of one address from an
//! Etherscan-compatible indexing API, then follows new blocks over a
//! WebSocket head subscription. Every normal and internal transaction
//! touching the address is delivered to an [`EventSink`] exactly once, in
//! chronological order.

pub mod backfill;
pub mod cache;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod events;
pub mod head;
pub mod indexer;
pub mod report;
pub mod retry;
pub mod rpc;
pub mod sink;
pub mod tailer;
pub mod types;

#[cfg(test)]
mod test_utils;

// Re-export the main types for convenience
pub use config::{Args, Config};
pub use cursor::Cursor;
pub use engine::{Engine, EngineConfig, EngineState};
pub use error::{ConfigError, EngineError, SourceError};
pub use events::{format_ether, ActivityBatch, EventIdentity, EventKind, TransactionEvent, WatchedAddress};
pub use head::{ChainHeadSource, HeadSubscription, WsHeadSource};
pub use indexer::{BlockRange, EtherscanClient, IndexingClient, Listing, PageLimits};
pub use report::{EngineStatus, Incident};
pub use sink::{CollectingSink, EventSink, LogSink, OutputFormat};
