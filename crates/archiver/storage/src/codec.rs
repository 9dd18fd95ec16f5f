//! Block payload encoding: JSON compressed with zstd.
//!
//! `decode(encode(block)) == block` for every block, including chain specific fields the
//! typed model does not name.

use crate::StorageError;
use archiver_primitives::{ArchivedBlock, json};

/// zstd level used for block payloads.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Encodes a block into a compressed payload.
pub fn encode(block: &ArchivedBlock) -> Result<Vec<u8>, StorageError> {
    let raw = serde_json::to_vec(block).map_err(|err| StorageError::Codec(err.to_string()))?;
    zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)
        .map_err(|err| StorageError::Codec(err.to_string()))
}

/// Decodes a payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<ArchivedBlock, StorageError> {
    let raw = zstd::decode_all(payload).map_err(|err| StorageError::Codec(err.to_string()))?;
    json::from_slice(&raw).map_err(|err| StorageError::Codec(err.to_string()))
}
