//! In-memory sink.

use crate::{BlockReader, BlockSink, StorageError, WatermarkStore, traits::ensure_number};
use archiver_primitives::ArchivedBlock;
use std::{collections::BTreeMap, sync::Mutex};

#[derive(Debug, Default)]
struct Inner {
    blocks: BTreeMap<u64, ArchivedBlock>,
    writes: Vec<u64>,
    watermark: Option<u64>,
    watermark_history: Vec<u64>,
    failing_writes: usize,
}

/// A [`BlockSink`] and [`WatermarkStore`] kept in memory.
///
/// Nothing survives the process. Records every write in order, which makes it the sink of
/// choice for dry runs and for asserting commit order in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<Inner>,
}

impl MemorySink {
    /// Creates an empty [`MemorySink`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the block numbers passed to successful [`BlockSink::store`] calls, in call
    /// order.
    pub fn writes(&self) -> Vec<u64> {
        self.inner.lock().map(|inner| inner.writes.clone()).unwrap_or_default()
    }

    /// Returns every watermark saved, in order.
    pub fn watermark_history(&self) -> Vec<u64> {
        self.inner.lock().map(|inner| inner.watermark_history.clone()).unwrap_or_default()
    }

    /// Returns the number of distinct blocks stored.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.blocks.len()).unwrap_or_default()
    }

    /// Returns `true` if no block is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next `count` calls to [`BlockSink::store`] fail with an I/O error.
    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_writes = count;
        }
    }
}

impl BlockSink for MemorySink {
    fn store(&self, block_number: u64, block: &ArchivedBlock) -> Result<(), StorageError> {
        ensure_number(block_number, block)?;

        let mut inner = self.inner.lock()?;
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(StorageError::Io(std::io::Error::other("injected write failure")));
        }
        inner.blocks.insert(block_number, block.clone());
        inner.writes.push(block_number);
        Ok(())
    }

    fn last_stored_block_number(&self) -> Result<u64, StorageError> {
        let inner = self.inner.lock()?;
        inner
            .blocks
            .last_key_value()
            .map(|(number, _)| *number)
            .ok_or_else(|| StorageError::EntryNotFound("no blocks stored".to_string()))
    }
}

impl BlockReader for MemorySink {
    fn read_block(&self, block_number: u64) -> Result<ArchivedBlock, StorageError> {
        let inner = self.inner.lock()?;
        inner
            .blocks
            .get(&block_number)
            .cloned()
            .ok_or_else(|| StorageError::EntryNotFound(format!("block {block_number}")))
    }
}

impl WatermarkStore for MemorySink {
    fn load_watermark(&self) -> Result<Option<u64>, StorageError> {
        Ok(self.inner.lock()?.watermark)
    }

    fn save_watermark(&self, block_number: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock()?;
        inner.watermark = Some(block_number);
        inner.watermark_history.push(block_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_blocks::block;

    #[test]
    fn test_store_is_idempotent() {
        let sink = MemorySink::new();
        let block = block(5, 2);

        sink.store(5, &block).unwrap();
        sink.store(5, &block).unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.read_block(5).unwrap(), block);
        assert_eq!(sink.last_stored_block_number().unwrap(), 5);
    }

    #[test]
    fn test_last_stored_is_max_not_latest() {
        let sink = MemorySink::new();
        sink.store(9, &block(9, 0)).unwrap();
        sink.store(3, &block(3, 0)).unwrap();
        assert_eq!(sink.last_stored_block_number().unwrap(), 9);
        assert_eq!(sink.writes(), vec![9, 3]);
    }

    #[test]
    fn test_empty_sink() {
        let sink = MemorySink::new();
        assert!(sink.last_stored_block_number().unwrap_err().is_not_found());
        assert!(sink.read_block(1).unwrap_err().is_not_found());
        assert_eq!(sink.load_watermark().unwrap(), None);
    }

    #[test]
    fn test_wrong_number_is_rejected() {
        let sink = MemorySink::new();
        assert!(matches!(sink.store(4, &block(5, 0)), Err(StorageError::ConflictError(_))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_injected_failures() {
        let sink = MemorySink::new();
        sink.fail_next_writes(1);
        assert!(matches!(sink.store(1, &block(1, 0)), Err(StorageError::Io(_))));
        sink.store(1, &block(1, 0)).unwrap();
        assert_eq!(sink.writes(), vec![1]);
    }
}
