//! The unit of archival.

use crate::{RpcBlock, RpcReceipt, RpcTransaction, TraceResult};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural defects that make a fetched block unfit for archival.
///
/// These reflect inconsistent node data, so refetching the same block is expected to
/// reproduce them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockValidationError {
    /// The number of receipts differs from the number of transactions.
    #[error("receipt count mismatch in block {block_number}: {receipts} receipts for {transactions} transactions")]
    ReceiptCountMismatch {
        /// The block number.
        block_number: u64,
        /// Number of transactions in the block.
        transactions: usize,
        /// Number of receipts collected.
        receipts: usize,
    },
    /// A transaction has no receipt.
    #[error("missing receipt for transaction {tx_hash} in block {block_number}")]
    MissingReceipt {
        /// The block number.
        block_number: u64,
        /// The transaction without a receipt.
        tx_hash: B256,
    },
    /// A receipt is stored under a different transaction hash than the one it reports.
    #[error("receipt keyed by {key} reports transaction {reported} in block {block_number}")]
    ReceiptHashMismatch {
        /// The block number.
        block_number: u64,
        /// The map key.
        key: B256,
        /// The `transactionHash` in the receipt.
        reported: B256,
    },
    /// The number of traces differs from the number of transactions.
    #[error("trace count mismatch in block {block_number}: {traces} traces for {transactions} transactions")]
    TraceCountMismatch {
        /// The block number.
        block_number: u64,
        /// Number of transactions in the block.
        transactions: usize,
        /// Number of traces collected.
        traces: usize,
    },
}

/// A block together with one receipt per transaction and optional call traces.
///
/// Constructed through [`ArchivedBlock::new`], which validates receipt and trace
/// parity. Once committed under its number it is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedBlock {
    /// The full block.
    pub block: RpcBlock,
    /// Receipts keyed by transaction hash.
    pub receipts: BTreeMap<B256, RpcReceipt>,
    /// Call traces aligned with `block.transactions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceResult>>,
}

impl ArchivedBlock {
    /// Assembles an [`ArchivedBlock`] and validates it.
    pub fn new(
        block: RpcBlock,
        receipts: BTreeMap<B256, RpcReceipt>,
        traces: Option<Vec<TraceResult>>,
    ) -> Result<Self, BlockValidationError> {
        let archived = Self { block, receipts, traces };
        archived.validate()?;
        Ok(archived)
    }

    /// Returns the block number.
    pub fn number(&self) -> u64 {
        self.block.number()
    }

    /// Returns the block hash.
    pub const fn hash(&self) -> B256 {
        self.block.hash
    }

    /// Returns the parent block hash.
    pub const fn parent_hash(&self) -> B256 {
        self.block.parent_hash
    }

    /// Returns the transactions in block order.
    pub fn transactions(&self) -> &[RpcTransaction] {
        &self.block.transactions
    }

    /// Returns the receipts in transaction order.
    ///
    /// Transactions without a receipt are skipped; a validated block has none.
    pub fn receipts_in_order(&self) -> impl Iterator<Item = &RpcReceipt> {
        self.block.transactions.iter().filter_map(|tx| self.receipts.get(&tx.hash))
    }

    /// Checks receipt and trace parity against the block's transactions.
    pub fn validate(&self) -> Result<(), BlockValidationError> {
        let block_number = self.number();
        let transactions = self.block.transactions.len();

        if self.receipts.len() != transactions {
            return Err(BlockValidationError::ReceiptCountMismatch {
                block_number,
                transactions,
                receipts: self.receipts.len(),
            });
        }

        for tx in &self.block.transactions {
            if !self.receipts.contains_key(&tx.hash) {
                return Err(BlockValidationError::MissingReceipt { block_number, tx_hash: tx.hash });
            }
        }

        for (key, receipt) in &self.receipts {
            if *key != receipt.transaction_hash {
                return Err(BlockValidationError::ReceiptHashMismatch {
                    block_number,
                    key: *key,
                    reported: receipt.transaction_hash,
                });
            }
        }

        if let Some(traces) = &self.traces &&
            traces.len() != transactions
        {
            return Err(BlockValidationError::TraceCountMismatch {
                block_number,
                transactions,
                traces: traces.len(),
            });
        }

        Ok(())
    }
}
