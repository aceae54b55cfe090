//! Shared fixtures for integration tests.

#![allow(dead_code)]

use addrwatch::types::{Block, Transaction};
use addrwatch::{
    ActivityBatch, BlockRange, ChainHeadSource, HeadSubscription, IndexingClient, Listing,
    SourceError, TransactionEvent, WatchedAddress,
};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const WATCHED: Address = Address::new([0x42; 20]);
pub const PEER: Address = Address::new([0x99; 20]);

pub fn normal(block: u64, tag: u8, value: u64) -> TransactionEvent {
    TransactionEvent::Normal {
        hash: B256::repeat_byte(tag),
        block_number: block,
        timestamp: 1_700_000_000 + block * 12,
        from: WATCHED,
        to: Some(PEER),
        value_wei: U256::from(value),
        input_prefix: "0x".into(),
    }
}

pub fn internal(block: u64, tag: u8, value: u64) -> TransactionEvent {
    TransactionEvent::Internal {
        parent_hash: B256::repeat_byte(tag),
        block_number: block,
        timestamp: 1_700_000_000 + block * 12,
        from: PEER,
        to: Some(WATCHED),
        value_wei: U256::from(value),
        call_type: "call".into(),
        trace_id: None,
    }
}

pub fn block_with(number: u64, txs: &[(u8, Address, Option<Address>)]) -> Block {
    Block {
        number,
        hash: B256::repeat_byte(number as u8),
        timestamp: 1_700_000_000 + number * 12,
        transactions: txs
            .iter()
            .map(|&(tag, from, to)| Transaction {
                hash: B256::repeat_byte(tag),
                from,
                to,
                value: U256::from(tag),
                input: Vec::new(),
            })
            .collect(),
    }
}

/// Indexer serving fixed lists, with an optional number of leading
/// rate-limit responses.
#[derive(Default)]
pub struct FixtureIndexer {
    pub normal: Vec<TransactionEvent>,
    pub internal: Vec<TransactionEvent>,
    pub rate_limited: Mutex<u32>,
}

fn select(events: &[TransactionEvent], range: Option<BlockRange>) -> ActivityBatch {
    events
        .iter()
        .filter(|e| range.as_ref().map_or(true, |r| r.contains(&e.block_number())))
        .cloned()
        .collect()
}

impl FixtureIndexer {
    fn throttle(&self) -> Result<(), SourceError> {
        let mut left = self.rate_limited.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(SourceError::RateLimited("Max rate limit reached".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexingClient for FixtureIndexer {
    async fn fetch_normal(
        &self,
        _address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError> {
        self.throttle()?;
        Ok(Listing::complete(select(&self.normal, range)))
    }

    async fn fetch_internal(
        &self,
        _address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError> {
        self.throttle()?;
        Ok(Listing::complete(select(&self.internal, range)))
    }
}

/// Head source replaying scripted sessions; cancels `done` when they run out.
pub struct ScriptedHeads {
    pub sessions: Mutex<VecDeque<Vec<u64>>>,
    pub blocks: HashMap<u64, Block>,
    pub done: CancellationToken,
    parked: Mutex<Vec<mpsc::Sender<u64>>>,
}

impl ScriptedHeads {
    pub fn new(done: CancellationToken, sessions: Vec<Vec<u64>>, blocks: Vec<Block>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            blocks: blocks.into_iter().map(|b| (b.number, b)).collect(),
            done,
            parked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChainHeadSource for ScriptedHeads {
    async fn subscribe(&self) -> Result<HeadSubscription, SourceError> {
        let next = self.sessions.lock().unwrap().pop_front();
        let (tx, rx) = mpsc::channel(64);
        match next {
            Some(heads) => {
                for n in heads {
                    tx.send(n).await.unwrap();
                }
            }
            None => {
                self.done.cancel();
                self.parked.lock().unwrap().push(tx);
            }
        }
        Ok(rx)
    }

    async fn get_block(&self, number: u64) -> Result<Block, SourceError> {
        self.blocks
            .get(&number)
            .cloned()
            .ok_or(SourceError::BlockNotFound(number))
    }
}
