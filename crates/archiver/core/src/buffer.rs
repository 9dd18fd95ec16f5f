//! Holds fetched blocks until they can be committed in order.

use crate::metrics::Metrics;
use archiver_primitives::ArchivedBlock;
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Notify;

/// Fetched blocks keyed by number, filled by the scheduler and drained by the committer.
///
/// Blocks arrive in any order. The committer only ever removes the next number it needs,
/// and only after the scheduler has fully inserted it. Once a number is taken it is
/// claimed, and the buffer refuses it and every lower number from then on.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    state: Mutex<State>,
    inserted: Notify,
}

#[derive(Debug, Default)]
struct State {
    blocks: BTreeMap<u64, ArchivedBlock>,
    /// Lowest number not yet taken by the committer.
    unclaimed: u64,
}

impl BlockBuffer {
    /// Creates an empty [`BlockBuffer`].
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Nothing panics while holding the lock, the state is always consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a fetched block, replacing any block buffered under the same number.
    ///
    /// Returns `false` and drops the block if its number has already been taken.
    pub fn insert(&self, block: ArchivedBlock) -> bool {
        let len = {
            let mut state = self.state();
            if block.number() < state.unclaimed {
                return false;
            }
            state.blocks.insert(block.number(), block);
            state.blocks.len()
        };
        Metrics::set_buffered(len);
        self.inserted.notify_waiters();
        true
    }

    /// Removes and returns the block buffered under `block_number`, claiming it and every
    /// lower number.
    pub fn take(&self, block_number: u64) -> Option<ArchivedBlock> {
        let (block, len) = {
            let mut state = self.state();
            let block = state.blocks.remove(&block_number);
            if block.is_some() {
                state.unclaimed = state.unclaimed.max(block_number.saturating_add(1));
            }
            (block, state.blocks.len())
        };
        if block.is_some() {
            Metrics::set_buffered(len);
        }
        block
    }

    /// Returns the lowest block number that has not been taken yet.
    pub fn first_unclaimed(&self) -> u64 {
        self.state().unclaimed
    }

    /// Returns `true` if `block_number` is neither buffered nor taken.
    pub fn is_missing(&self, block_number: u64) -> bool {
        let state = self.state();
        block_number >= state.unclaimed && !state.blocks.contains_key(&block_number)
    }

    /// Returns `true` if a block is buffered under `block_number`.
    pub fn contains(&self, block_number: u64) -> bool {
        self.state().blocks.contains_key(&block_number)
    }

    /// Returns the number of buffered blocks.
    pub fn len(&self) -> usize {
        self.state().blocks.len()
    }

    /// Returns `true` if no block is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every buffered block. Claimed numbers stay claimed.
    pub fn clear(&self) {
        self.state().blocks.clear();
        Metrics::set_buffered(0);
    }

    /// Waits until `block_number` is buffered, then removes and returns it.
    pub async fn wait_for(&self, block_number: u64) -> ArchivedBlock {
        loop {
            let notified = self.inserted.notified();
            tokio::pin!(notified);
            // Register before checking, so an insert between the check and the await is
            // not missed.
            notified.as_mut().enable();

            if let Some(block) = self.take(block_number) {
                return block;
            }
            notified.await;
        }
    }
}
