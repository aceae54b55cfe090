//! Engine cursor: the highest block whose activity has been fully emitted.

/// Position of the engine in the chain.
///
/// Starts unset. Once set it never moves backwards; `advance` to a lower
/// block is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    last_processed: Option<u64>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_processed(&self) -> Option<u64> {
        self.last_processed
    }

    /// Move to `block` if it is ahead of the current position.
    /// Returns `false` if the cursor did not move.
    pub fn advance(&mut self, block: u64) -> bool {
        match self.last_processed {
            Some(current) if block <= current => false,
            _ => {
                self.last_processed = Some(block);
                true
            }
        }
    }

    /// True if `block` has not been processed yet.
    pub fn accepts(&self, block: u64) -> bool {
        self.last_processed.map_or(true, |current| block > current)
    }

    /// Next block expected in sequence, if the cursor is set.
    pub fn next_block(&self) -> Option<u64> {
        self.last_processed.map(|b| b + 1)
    }
}
