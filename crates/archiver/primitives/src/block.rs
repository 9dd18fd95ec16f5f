//! Block and transaction objects as returned by `eth_getBlockByNumber(tag, true)`.

use alloy_primitives::{B256, U64};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A full block with transaction objects.
///
/// Only the fields the archiver reasons about are typed. Every other header field is
/// kept in [`RpcBlock::other`] and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    /// The block number.
    pub number: U64,
    /// The block hash reported by the node.
    pub hash: B256,
    /// The hash of the parent block.
    pub parent_hash: B256,
    /// Full transaction objects, in block order.
    pub transactions: Vec<RpcTransaction>,
    /// Remaining header fields.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RpcBlock {
    /// Returns the block number as a `u64`.
    pub fn number(&self) -> u64 {
        self.number.to()
    }

    /// Returns the hashes of the block's transactions in block order.
    pub fn transaction_hashes(&self) -> Vec<B256> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }
}

/// A transaction object inside a full block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcTransaction {
    /// The transaction hash.
    pub hash: B256,
    /// Remaining transaction fields.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}
