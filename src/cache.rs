//! Recently-emitted event identities
//!
//! Bounded dedup window so a redelivered block (e.g. after a head
//! reconnect) or an overlapping indexer response does not reach the sink
//! twice.
//!
//! Strategy:
//! - Identities are remembered in emission order
//! - Once the window is full, the oldest identity is forgotten first

use crate::events::{ActivityBatch, EventIdentity};
use std::collections::{HashSet, VecDeque};

/// FIFO-bounded set of event identities.
pub struct RecentIdentities {
    capacity: usize,
    order: VecDeque<EventIdentity>,
    seen: HashSet<EventIdentity>,
}

impl RecentIdentities {
    /// Create an empty window holding at most `capacity` identities.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn contains(&self, identity: &EventIdentity) -> bool {
        self.seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop events whose identity was already emitted.
    ///
    /// Only previously emitted batches count: two identical events inside
    /// `batch` are both kept. Returns how many were dropped.
    pub fn filter_new(&self, batch: &mut ActivityBatch) -> usize {
        let before = batch.len();
        batch.retain(|event| !self.seen.contains(&event.identity()));
        before - batch.len()
    }

    /// Record every identity in an emitted batch.
    pub fn remember(&mut self, batch: &ActivityBatch) {
        for event in batch.iter() {
            let identity = event.identity();
            if !self.seen.insert(identity.clone()) {
                continue;
            }
            self.order.push_back(identity);
            if self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
    }
}
