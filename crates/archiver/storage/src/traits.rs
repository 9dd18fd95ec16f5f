//! Traits implemented by block sinks and watermark stores.

use crate::StorageError;
use archiver_primitives::ArchivedBlock;
use std::{fmt::Debug, sync::Arc};

/// Durable destination for archived blocks.
///
/// Writes are upserts keyed by block number: storing the same block twice leaves the
/// sink indistinguishable from storing it once. Calls block the current thread, so async
/// callers should run them on a blocking pool.
///
/// Implementations are expected to provide thread-safe access.
pub trait BlockSink: Debug + Send + Sync {
    /// Durably stores `block` under `block_number`.
    ///
    /// # Returns
    /// * `Ok(())` once the write is durable.
    /// * `Err(StorageError::ConflictError)` if `block_number` differs from the block's own
    ///   number.
    fn store(&self, block_number: u64, block: &ArchivedBlock) -> Result<(), StorageError>;

    /// Returns the highest stored block number, regardless of the order blocks were
    /// written in.
    ///
    /// # Returns
    /// * `Ok(u64)` the highest stored number.
    /// * `Err(StorageError::EntryNotFound)` if the sink is empty.
    fn last_stored_block_number(&self) -> Result<u64, StorageError>;
}

/// Read access to stored blocks.
pub trait BlockReader: Debug + Send + Sync {
    /// Reads the block stored under `block_number`.
    ///
    /// Returns [`StorageError::EntryNotFound`] if nothing is stored under that number.
    fn read_block(&self, block_number: u64) -> Result<ArchivedBlock, StorageError>;
}

/// Persistence for the archiver's watermark, the last block number whose write is confirmed.
pub trait WatermarkStore: Debug + Send + Sync {
    /// Loads the watermark, `None` if none was ever saved.
    fn load_watermark(&self) -> Result<Option<u64>, StorageError>;

    /// Durably replaces the watermark.
    fn save_watermark(&self, block_number: u64) -> Result<(), StorageError>;
}

/// Checks that a block is being stored under its own number.
pub(crate) fn ensure_number(block_number: u64, block: &ArchivedBlock) -> Result<(), StorageError> {
    if block.number() != block_number {
        return Err(StorageError::ConflictError(format!(
            "block {} stored under number {block_number}",
            block.number()
        )));
    }
    Ok(())
}

impl<T> BlockSink for Arc<T>
where
    T: BlockSink + ?Sized,
{
    fn store(&self, block_number: u64, block: &ArchivedBlock) -> Result<(), StorageError> {
        (**self).store(block_number, block)
    }

    fn last_stored_block_number(&self) -> Result<u64, StorageError> {
        (**self).last_stored_block_number()
    }
}

impl<T> BlockReader for Arc<T>
where
    T: BlockReader + ?Sized,
{
    fn read_block(&self, block_number: u64) -> Result<ArchivedBlock, StorageError> {
        (**self).read_block(block_number)
    }
}

impl<T> WatermarkStore for Arc<T>
where
    T: WatermarkStore + ?Sized,
{
    fn load_watermark(&self) -> Result<Option<u64>, StorageError> {
        (**self).load_watermark()
    }

    fn save_watermark(&self, block_number: u64) -> Result<(), StorageError> {
        (**self).save_watermark(block_number)
    }
}
