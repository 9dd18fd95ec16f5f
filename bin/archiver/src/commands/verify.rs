//! Verify Subcommand

use crate::flags::{GlobalArgs, SinkKind};
use alloy_primitives::B256;
use anyhow::{Context as _, Result};
use archiver_primitives::BlockValidationError;
use archiver_storage::{BlockReader, BlockSink, MdbxSink, ShardedFileSink, StorageError};
use clap::Parser;
use std::sync::Arc;

/// Inconsistencies found by [`verify_range`].
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// No block is stored under this number.
    #[error("gap at block {0}")]
    Gap(u64),
    /// The block stored under a number is a different block.
    #[error("block {actual} is stored under number {stored_under}")]
    NumberMismatch {
        /// The number the block was read under.
        stored_under: u64,
        /// The block's own number.
        actual: u64,
    },
    /// A stored block is internally inconsistent.
    #[error("block {block_number}: {source}")]
    Invalid {
        /// The offending block.
        block_number: u64,
        /// The validation error.
        #[source]
        source: BlockValidationError,
    },
    /// A stored block does not link to the block before it.
    #[error("block {block_number} has parent hash {actual}, previous block hash is {expected}")]
    ParentHashMismatch {
        /// The offending block.
        block_number: u64,
        /// Hash of the previous stored block.
        expected: B256,
        /// Parent hash of the offending block.
        actual: B256,
    },
    /// The sink could not be read.
    #[error("failed to read block {block_number}: {source}")]
    Storage {
        /// The block being read.
        block_number: u64,
        /// The storage error.
        #[source]
        source: StorageError,
    },
}

/// Checks that `[from, to]` is stored without gaps, that every block sits under its own
/// number with one receipt per transaction and, if `check_parent_hash` is set, that each
/// block links to the one before it.
///
/// Returns the number of blocks checked, or the first inconsistency.
pub fn verify_range<R>(
    reader: &R,
    from: u64,
    to: u64,
    check_parent_hash: bool,
) -> Result<u64, VerifyError>
where
    R: BlockReader + ?Sized,
{
    let mut parent: Option<B256> = None;
    let mut checked = 0;

    for block_number in from..=to {
        let block = match reader.read_block(block_number) {
            Ok(block) => block,
            Err(err) if err.is_not_found() => return Err(VerifyError::Gap(block_number)),
            Err(source) => return Err(VerifyError::Storage { block_number, source }),
        };

        if block.number() != block_number {
            return Err(VerifyError::NumberMismatch {
                stored_under: block_number,
                actual: block.number(),
            });
        }
        block.validate().map_err(|source| VerifyError::Invalid { block_number, source })?;

        if check_parent_hash &&
            let Some(expected) = parent &&
            block.parent_hash() != expected
        {
            return Err(VerifyError::ParentHashMismatch {
                block_number,
                expected,
                actual: block.parent_hash(),
            });
        }

        parent = Some(block.hash());
        checked += 1;
        if checked % 100_000 == 0 {
            info!(target: "verify", block_number, checked, "Verification progress");
        }
    }

    Ok(checked)
}

/// The `verify` Subcommand
///
/// Reads a stored block range back and reports the first gap or inconsistent block.
///
/// # Usage
///
/// ```sh
/// archiver verify --chain-id <ID> [--from <N>] [--to <N>]
/// ```
#[derive(Parser, Debug, Clone)]
#[command(about = "Checks an archive for gaps and inconsistent blocks")]
pub struct VerifyCommand {
    /// Chain whose archive is verified.
    #[arg(long = "chain-id", env = "CHAIN_ID")]
    pub chain_id: u64,
    /// First block to check.
    #[arg(long, default_value_t = 1)]
    pub from: u64,
    /// Last block to check. Defaults to the highest stored block.
    #[arg(long)]
    pub to: Option<u64>,
    /// Also checks that each block's parent hash is the previous block's hash.
    #[arg(long = "check-parent-hash")]
    pub check_parent_hash: bool,
}

impl VerifyCommand {
    /// Runs the verification.
    pub async fn run(self, args: &GlobalArgs) -> Result<()> {
        let dir = args.storage.chain_dir(self.chain_id);
        anyhow::ensure!(dir.exists(), "no archive at {}", dir.display());

        let checked = match args.storage.sink {
            SinkKind::Files => {
                let sink = ShardedFileSink::open(dir.join("blocks"), args.storage.max_shard_bytes())
                    .context("failed to open shard files")?;
                self.verify(Arc::new(sink)).await?
            }
            SinkKind::Mdbx => {
                let sink = MdbxSink::open(&dir.join("mdbx")).context("failed to open MDBX sink")?;
                self.verify(Arc::new(sink)).await?
            }
            SinkKind::Memory => anyhow::bail!("the memory sink keeps nothing to verify"),
        };

        info!(target: "verify", chain_id = self.chain_id, checked, "Archive is consistent");
        Ok(())
    }

    async fn verify<K>(&self, sink: Arc<K>) -> Result<u64>
    where
        K: BlockSink + BlockReader + 'static,
    {
        let from = self.from;
        let to = match self.to {
            Some(to) => to,
            None => sink.last_stored_block_number().context("archive is empty")?,
        };
        anyhow::ensure!(to >= from, "range end {to} is before range start {from}");
        let check_parent_hash = self.check_parent_hash;

        info!(target: "verify", from, to, check_parent_hash, "Verifying archive");
        tokio::task::spawn_blocking(move || verify_range(&*sink, from, to, check_parent_hash))
            .await?
            .with_context(|| format!("archive is inconsistent in [{from}, {to}]"))
    }
}
