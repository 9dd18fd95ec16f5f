//! The block source seam between the scheduler and the RPC layer.

use crate::FetchError;
use archiver_primitives::ArchivedBlock;
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

/// Where the scheduler gets blocks and the chain head from.
#[async_trait]
pub trait BlockSource: Debug + Send + Sync {
    /// Fetches and validates the block at `block_number`.
    async fn fetch_block(&self, block_number: u64) -> Result<ArchivedBlock, FetchError>;

    /// Returns the current chain head.
    async fn chain_head(&self) -> Result<u64, FetchError>;
}

#[async_trait]
impl<T> BlockSource for Arc<T>
where
    T: BlockSource + ?Sized,
{
    async fn fetch_block(&self, block_number: u64) -> Result<ArchivedBlock, FetchError> {
        (**self).fetch_block(block_number).await
    }

    async fn chain_head(&self) -> Result<u64, FetchError> {
        (**self).chain_head().await
    }
}
