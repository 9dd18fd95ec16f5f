//! MDBX backed sink.

mod models;
pub use models::{ArchivedBlocks, StoredBlock, StoredWatermark, Watermarks};
use models::{ArchiverTables, WATERMARK_KEY};

use crate::{BlockReader, BlockSink, StorageError, WatermarkStore, codec, traits::ensure_number};
use archiver_primitives::ArchivedBlock;
use reth_db::{
    DatabaseEnv,
    mdbx::{DatabaseArguments, init_db_for},
};
use reth_db_api::{
    cursor::DbCursorRO,
    database::Database,
    transaction::{DbTx, DbTxMut},
};
use std::path::Path;
use tracing::{error, info};

/// A [`BlockSink`] and [`WatermarkStore`] on one MDBX environment.
///
/// Each block is one row keyed by its number, so rewrites replace the row.
#[derive(Debug)]
pub struct MdbxSink {
    env: DatabaseEnv,
}

impl MdbxSink {
    /// Creates or opens a database environment at the given path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let env = init_db_for::<_, ArchiverTables>(path, DatabaseArguments::default())
            .map_err(|err| StorageError::DatabaseInit(err.to_string()))?;
        info!(target: "storage", path = %path.display(), "Opened MDBX sink");
        Ok(Self { env })
    }
}

impl BlockSink for MdbxSink {
    fn store(&self, block_number: u64, block: &ArchivedBlock) -> Result<(), StorageError> {
        ensure_number(block_number, block)?;
        let payload = StoredBlock(codec::encode(block)?);

        self.env.update(|tx| tx.put::<ArchivedBlocks>(block_number, payload)).inspect_err(
            |err| error!(target: "storage", block_number, %err, "Failed to store block"),
        )??;
        Ok(())
    }

    fn last_stored_block_number(&self) -> Result<u64, StorageError> {
        let last = self.env.view(|tx| {
            let mut cursor = tx.cursor_read::<ArchivedBlocks>()?;
            cursor.last().map(|entry| entry.map(|(number, _)| number))
        })??;
        last.ok_or_else(|| StorageError::EntryNotFound("no blocks stored".to_string()))
    }
}

impl BlockReader for MdbxSink {
    fn read_block(&self, block_number: u64) -> Result<ArchivedBlock, StorageError> {
        let stored = self
            .env
            .view(|tx| tx.get::<ArchivedBlocks>(block_number))??
            .ok_or_else(|| StorageError::EntryNotFound(format!("block {block_number}")))?;
        codec::decode(&stored.0)
    }
}

impl WatermarkStore for MdbxSink {
    fn load_watermark(&self) -> Result<Option<u64>, StorageError> {
        let stored = self.env.view(|tx| tx.get::<Watermarks>(WATERMARK_KEY))??;
        Ok(stored.map(|watermark| watermark.0))
    }

    fn save_watermark(&self, block_number: u64) -> Result<(), StorageError> {
        self.env
            .update(|tx| tx.put::<Watermarks>(WATERMARK_KEY, StoredWatermark(block_number)))??;
        Ok(())
    }
}
