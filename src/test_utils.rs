//! In-memory data sources for unit tests.

use crate::error::SourceError;
use crate::events::{ActivityBatch, TransactionEvent, WatchedAddress};
use crate::head::{ChainHeadSource, HeadSubscription};
use crate::indexer::{BlockRange, IndexingClient, Listing};
use crate::types::{Block, Transaction};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const WATCHED: Address = Address::new([0x07; 20]);
pub const OTHER: Address = Address::new([0xda; 20]);

pub fn watched() -> WatchedAddress {
    WatchedAddress::new(WATCHED)
}

pub fn normal_event(block: u64, tag: u8) -> TransactionEvent {
    TransactionEvent::Normal {
        hash: B256::repeat_byte(tag),
        block_number: block,
        timestamp: block * 12,
        from: WATCHED,
        to: Some(OTHER),
        value_wei: U256::from(tag),
        input_prefix: "0x".into(),
    }
}

pub fn internal_event(block: u64, tag: u8) -> TransactionEvent {
    TransactionEvent::Internal {
        parent_hash: B256::repeat_byte(tag),
        block_number: block,
        timestamp: block * 12,
        from: OTHER,
        to: Some(WATCHED),
        value_wei: U256::from(tag),
        call_type: "call".into(),
        trace_id: Some("0".into()),
    }
}

pub fn tx(tag: u8, from: Address, to: Option<Address>) -> Transaction {
    Transaction {
        hash: B256::repeat_byte(tag),
        from,
        to,
        value: U256::from(tag),
        input: Vec::new(),
    }
}

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        hash: B256::repeat_byte(0xbb),
        timestamp: number * 12,
        transactions,
    }
}

/// Indexing client backed by fixed event lists. Range queries filter by
/// block number; scripted failures are returned first.
#[derive(Default)]
pub struct MockIndexer {
    normal: Mutex<Vec<TransactionEvent>>,
    internal: Mutex<Vec<TransactionEvent>>,
    normal_failures: Mutex<VecDeque<SourceError>>,
    internal_failures: Mutex<VecDeque<SourceError>>,
    failing_internal_blocks: Mutex<HashSet<u64>>,
    internal_truncated: Mutex<bool>,
    normal_calls: Mutex<u32>,
    internal_calls: Mutex<u32>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_normal(&self, events: Vec<TransactionEvent>) {
        *self.normal.lock().unwrap() = events;
    }

    pub fn set_internal(&self, events: Vec<TransactionEvent>) {
        *self.internal.lock().unwrap() = events;
    }

    pub fn fail_normal_next(&self, errors: Vec<SourceError>) {
        self.normal_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_internal_next(&self, errors: Vec<SourceError>) {
        self.internal_failures.lock().unwrap().extend(errors);
    }

    /// Every single-block internal query for `block` fails.
    pub fn fail_internal_for_block(&self, block: u64) {
        self.failing_internal_blocks.lock().unwrap().insert(block);
    }

    /// Full-history internal queries report hitting the result cap.
    pub fn truncate_internal(&self) {
        *self.internal_truncated.lock().unwrap() = true;
    }

    pub fn normal_calls(&self) -> u32 {
        *self.normal_calls.lock().unwrap()
    }

    pub fn internal_calls(&self) -> u32 {
        *self.internal_calls.lock().unwrap()
    }
}

fn in_range(events: &[TransactionEvent], range: &Option<BlockRange>) -> ActivityBatch {
    events
        .iter()
        .filter(|e| range.as_ref().map_or(true, |r| r.contains(&e.block_number())))
        .cloned()
        .collect()
}

#[async_trait]
impl IndexingClient for MockIndexer {
    async fn fetch_normal(
        &self,
        _address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError> {
        *self.normal_calls.lock().unwrap() += 1;
        if let Some(err) = self.normal_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Listing::complete(in_range(&self.normal.lock().unwrap(), &range)))
    }

    async fn fetch_internal(
        &self,
        _address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError> {
        *self.internal_calls.lock().unwrap() += 1;
        if let Some(err) = self.internal_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(r) = &range {
            if self.failing_internal_blocks.lock().unwrap().contains(r.start()) {
                return Err(SourceError::Unavailable("internal list down".into()));
            }
        }
        Ok(Listing {
            events: in_range(&self.internal.lock().unwrap(), &range),
            truncated: range.is_none() && *self.internal_truncated.lock().unwrap(),
        })
    }
}

/// Head source replaying scripted sessions.
///
/// Each `subscribe` call consumes one session: its numbers are delivered,
/// then the channel closes (a disconnect). Once the sessions run out the
/// source cancels `done` and returns a subscription that stays silent.
pub struct MockHeads {
    sessions: Mutex<VecDeque<Result<Vec<u64>, SourceError>>>,
    blocks: Mutex<HashMap<u64, Block>>,
    block_failures: Mutex<HashMap<u64, VecDeque<SourceError>>>,
    parked: Mutex<Vec<mpsc::Sender<u64>>>,
    done: CancellationToken,
}

impl MockHeads {
    pub fn new(done: CancellationToken) -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            blocks: Mutex::new(HashMap::new()),
            block_failures: Mutex::new(HashMap::new()),
            parked: Mutex::new(Vec::new()),
            done,
        }
    }

    pub fn session(&self, heads: Vec<u64>) -> &Self {
        self.sessions.lock().unwrap().push_back(Ok(heads));
        self
    }

    pub fn failed_session(&self, err: SourceError) -> &Self {
        self.sessions.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn add_block(&self, block: Block) -> &Self {
        self.blocks.lock().unwrap().insert(block.number, block);
        self
    }

    /// Queue failures returned by `get_block(number)` before it succeeds.
    pub fn fail_block(&self, number: u64, errors: Vec<SourceError>) -> &Self {
        self.block_failures
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .extend(errors);
        self
    }
}

#[async_trait]
impl ChainHeadSource for MockHeads {
    async fn subscribe(&self) -> Result<HeadSubscription, SourceError> {
        let next = self.sessions.lock().unwrap().pop_front();
        let (tx, rx) = mpsc::channel(64);
        match next {
            Some(Ok(heads)) => {
                for n in heads {
                    tx.send(n).await.expect("receiver alive");
                }
            }
            Some(Err(err)) => return Err(err),
            None => {
                self.done.cancel();
                self.parked.lock().unwrap().push(tx);
            }
        }
        Ok(rx)
    }

    async fn get_block(&self, number: u64) -> Result<Block, SourceError> {
        if let Some(queue) = self.block_failures.lock().unwrap().get_mut(&number) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or(SourceError::BlockNotFound(number))
    }
}
