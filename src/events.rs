//! Normalized activity model
//!
//! Both data sources are reduced to [`TransactionEvent`]s before they reach
//! the engine's dedup window or the sink. Wei values stay `U256` all the way
//! through; [`format_ether`] is only called by presentation code.

use crate::types::{Block, IndexedTx, Transaction};
use alloy_primitives::{Address, B256, U256};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The one account this process watches.
///
/// Stored as raw bytes, so matching is case-insensitive no matter how the
/// address was written in config or in an API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchedAddress(Address);

impl WatchedAddress {
    pub fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }

    /// True if the address is the sender or the recipient.
    pub fn matches(&self, from: Address, to: Option<Address>) -> bool {
        from == self.0 || to == Some(self.0)
    }
}

impl FromStr for WatchedAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::types::parse_address(s.trim()).map(Self)
    }
}

impl fmt::Display for WatchedAddress {
    /// Lower-case hex, the form the indexing API expects.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Discriminant used in [`EventIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Normal,
    Internal,
}

/// A single piece of activity touching the watched address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransactionEvent {
    Normal {
        hash: B256,
        block_number: u64,
        timestamp: u64,
        from: Address,
        to: Option<Address>,
        #[serde(serialize_with = "serialize_wei")]
        value_wei: U256,
        /// Method selector, or "0x" for a plain transfer
        input_prefix: String,
    },
    Internal {
        parent_hash: B256,
        block_number: u64,
        timestamp: u64,
        from: Address,
        to: Option<Address>,
        #[serde(serialize_with = "serialize_wei")]
        value_wei: U256,
        call_type: String,
        trace_id: Option<String>,
    },
}

/// Identity tuple used for deduplication:
/// `(block, hash or parent hash, kind, value, from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventIdentity {
    pub block_number: u64,
    pub hash: B256,
    pub kind: EventKind,
    pub value_wei: U256,
    pub from: Address,
    pub to: Option<Address>,
}

impl TransactionEvent {
    /// Build a normal event from a transaction found in a block body.
    pub fn from_block_tx(block: &Block, tx: &Transaction) -> Self {
        Self::Normal {
            hash: tx.hash,
            block_number: block.number,
            timestamp: block.timestamp,
            from: tx.from,
            to: tx.to,
            value_wei: tx.value,
            input_prefix: input_prefix(&tx.input),
        }
    }

    /// Build a normal event from an indexing API `txlist` record.
    pub fn normal_from_indexed(rec: &IndexedTx) -> Self {
        Self::Normal {
            hash: rec.hash,
            block_number: rec.block_number,
            timestamp: rec.timestamp,
            from: rec.from,
            to: rec.to,
            value_wei: rec.value,
            input_prefix: input_prefix(&rec.input),
        }
    }

    /// Build an internal event from an indexing API `txlistinternal` record.
    pub fn internal_from_indexed(rec: &IndexedTx) -> Self {
        Self::Internal {
            parent_hash: rec.hash,
            block_number: rec.block_number,
            timestamp: rec.timestamp,
            from: rec.from,
            to: rec.to,
            value_wei: rec.value,
            call_type: rec.call_type.clone(),
            trace_id: (!rec.trace_id.is_empty()).then(|| rec.trace_id.clone()),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Normal { .. } => EventKind::Normal,
            Self::Internal { .. } => EventKind::Internal,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Self::Normal { block_number, .. } | Self::Internal { block_number, .. } => *block_number,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Normal { timestamp, .. } | Self::Internal { timestamp, .. } => *timestamp,
        }
    }

    pub fn value_wei(&self) -> U256 {
        match self {
            Self::Normal { value_wei, .. } | Self::Internal { value_wei, .. } => *value_wei,
        }
    }

    pub fn identity(&self) -> EventIdentity {
        match self {
            Self::Normal { hash, block_number, from, to, value_wei, .. } => EventIdentity {
                block_number: *block_number,
                hash: *hash,
                kind: EventKind::Normal,
                value_wei: *value_wei,
                from: *from,
                to: *to,
            },
            Self::Internal { parent_hash, block_number, from, to, value_wei, .. } => {
                EventIdentity {
                    block_number: *block_number,
                    hash: *parent_hash,
                    kind: EventKind::Internal,
                    value_wei: *value_wei,
                    from: *from,
                    to: *to,
                }
            }
        }
    }
}

/// Ordered events from one backfill pass or one block.
///
/// Order is chronological and is preserved all the way to the sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActivityBatch(Vec<TransactionEvent>);

impl ActivityBatch {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, event: TransactionEvent) {
        self.0.push(event);
    }

    pub fn extend(&mut self, other: ActivityBatch) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn events(&self) -> &[TransactionEvent] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TransactionEvent> {
        self.0.iter()
    }

    /// Highest block number in the batch.
    pub fn max_block(&self) -> Option<u64> {
        self.0.iter().map(TransactionEvent::block_number).max()
    }

    /// Stable sort by (block, timestamp). Events that tie keep their
    /// relative order, so normal transactions merged ahead of internal ones
    /// stay ahead within a block.
    pub fn sort_chronologically(&mut self) {
        self.0.sort_by_key(|e| (e.block_number(), e.timestamp()));
    }

    pub fn retain(&mut self, f: impl FnMut(&TransactionEvent) -> bool) {
        self.0.retain(f);
    }
}

impl FromIterator<TransactionEvent> for ActivityBatch {
    fn from_iter<T: IntoIterator<Item = TransactionEvent>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ActivityBatch {
    type Item = TransactionEvent;
    type IntoIter = std::vec::IntoIter<TransactionEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Render a wei amount as a decimal ether string without losing precision.
///
/// Trailing zeros in the fractional part are dropped; whole amounts render
/// without a decimal point.
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(1_000_000_000_000_000_000u64);
    let whole = wei / unit;
    let frac = wei % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>18}", frac.to_string());
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

fn input_prefix(input: &[u8]) -> String {
    format!("0x{}", hex::encode(&input[..input.len().min(4)]))
}

fn serialize_wei<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}
