//! Error types for the archival pipeline.

use crate::ConfigError;
use alloy_primitives::B256;
use archiver_primitives::BlockValidationError;
use archiver_rpc::RpcError;
use archiver_storage::StorageError;
use thiserror::Error;

/// Errors from fetching a single block.
///
/// Every variant is either transient, and the fetch is reissued later, or structural: the
/// node returned inconsistent data, so reissuing would reproduce it. See
/// [`FetchError::is_structural`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// A block or receipt call failed.
    #[error("rpc call for block {block_number} failed: {source}")]
    Rpc {
        /// The block being fetched.
        block_number: u64,
        /// The underlying error.
        #[source]
        source: RpcError,
    },

    /// The chain head could not be read.
    #[error("failed to read chain head: {0}")]
    Head(#[source] RpcError),

    /// A per-transaction trace call failed.
    #[error("trace of transaction {tx_hash} in block {block_number} failed: {source}")]
    Trace {
        /// The block being fetched.
        block_number: u64,
        /// The transaction being traced.
        tx_hash: B256,
        /// The underlying error.
        #[source]
        source: RpcError,
    },

    /// The node has no receipt for a transaction of the block yet.
    #[error("receipt for transaction {tx_hash} in block {block_number} is not available")]
    ReceiptUnavailable {
        /// The block being fetched.
        block_number: u64,
        /// The transaction without a receipt.
        tx_hash: B256,
    },

    /// The node returned `null` for the block.
    #[error("block {0} returned null")]
    NullBlock(u64),

    /// The block did not decode, typically because the transactions field is missing or
    /// holds hashes only.
    #[error("block {block_number} is malformed: {reason}")]
    MalformedBlock {
        /// The block being fetched.
        block_number: u64,
        /// The decoder's message.
        reason: String,
    },

    /// A receipt did not decode.
    #[error("receipt for transaction {tx_hash} in block {block_number} is malformed: {reason}")]
    MalformedReceipt {
        /// The block being fetched.
        block_number: u64,
        /// The transaction whose receipt is malformed.
        tx_hash: B256,
        /// The decoder's message.
        reason: String,
    },

    /// A transaction trace did not decode.
    #[error("trace of transaction {tx_hash} in block {block_number} is malformed: {reason}")]
    MalformedTrace {
        /// The block being fetched.
        block_number: u64,
        /// The traced transaction.
        tx_hash: B256,
        /// The decoder's message.
        reason: String,
    },

    /// The node answered with a different block than requested.
    #[error("requested block {requested}, node returned block {returned}")]
    NumberMismatch {
        /// The requested number.
        requested: u64,
        /// The number in the returned block.
        returned: u64,
    },

    /// Receipts or traces do not line up with the block's transactions.
    #[error(transparent)]
    Invalid(#[from] BlockValidationError),

    /// The concurrency limiter was closed.
    #[error("fetch limiter closed")]
    LimiterClosed,
}

impl FetchError {
    /// Returns `true` if retrying the fetch would reproduce the error.
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NullBlock(_) |
                Self::MalformedBlock { .. } |
                Self::MalformedReceipt { .. } |
                Self::MalformedTrace { .. } |
                Self::NumberMismatch { .. } |
                Self::Invalid(_)
        )
    }

    /// Returns a short label for metrics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rpc { .. } => "rpc",
            Self::Head(_) => "head",
            Self::Trace { .. } => "trace",
            Self::ReceiptUnavailable { .. } => "receipt_unavailable",
            Self::NullBlock(_) => "null_block",
            Self::MalformedBlock { .. } => "malformed_block",
            Self::MalformedReceipt { .. } => "malformed_receipt",
            Self::MalformedTrace { .. } => "malformed_trace",
            Self::NumberMismatch { .. } => "number_mismatch",
            Self::Invalid(_) => "invalid",
            Self::LimiterClosed => "limiter_closed",
        }
    }
}

/// Errors from computing the resume point.
#[derive(Debug, Error)]
pub enum ResumeError {
    /// The watermark claims blocks the sink does not hold.
    #[error("watermark {watermark} is ahead of the last stored block {last_stored:?}")]
    WatermarkAhead {
        /// The persisted watermark.
        watermark: u64,
        /// The sink's last stored block, `None` if the sink is empty.
        last_stored: Option<u64>,
    },

    /// The sink or watermark store could not be read.
    #[error("failed to read resume state: {0}")]
    Storage(#[from] StorageError),
}

/// Fatal errors that stop the archiver.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The resume point could not be established.
    #[error(transparent)]
    Resume(#[from] ResumeError),

    /// A fetch failed with a structural error.
    #[error("block {block_number}: {source}")]
    Fetch {
        /// The offending block.
        block_number: u64,
        /// The fetch error.
        #[source]
        source: FetchError,
    },

    /// A buffered block failed validation before commit.
    #[error("block {block_number}: {source}")]
    Invalid {
        /// The offending block.
        block_number: u64,
        /// The validation error.
        #[source]
        source: BlockValidationError,
    },

    /// A block does not link to the previously committed block.
    #[error("block {block_number} has parent hash {actual}, previous block hash is {expected}")]
    ParentHashMismatch {
        /// The offending block.
        block_number: u64,
        /// Hash of the previously committed block.
        expected: B256,
        /// Parent hash of the offending block.
        actual: B256,
    },

    /// The sink rejected a block after every retry.
    #[error("failed to store block {block_number}: {source}")]
    Store {
        /// The block being stored.
        block_number: u64,
        /// The last storage error.
        #[source]
        source: StorageError,
    },

    /// The watermark could not be saved after every retry.
    #[error("failed to save watermark {block_number}: {source}")]
    Watermark {
        /// The watermark value being saved.
        block_number: u64,
        /// The last storage error.
        #[source]
        source: StorageError,
    },

    /// A pipeline task panicked or was aborted.
    #[error("pipeline task failed: {0}")]
    Task(String),
}

impl ArchiverError {
    /// Returns the block number the error is about, if any.
    pub const fn block_number(&self) -> Option<u64> {
        match self {
            Self::Fetch { block_number, .. } |
            Self::Invalid { block_number, .. } |
            Self::ParentHashMismatch { block_number, .. } |
            Self::Store { block_number, .. } |
            Self::Watermark { block_number, .. } => Some(*block_number),
            _ => None,
        }
    }
}
