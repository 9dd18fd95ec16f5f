//! Record framing inside a shard file.
//!
//! ```text
//! +----------------------+----------------------+------------------+
//! | block number (u64 BE)| payload len (u32 BE) | payload (zstd)   |
//! +----------------------+----------------------+------------------+
//! ```

use crate::StorageError;
use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read, Seek, SeekFrom},
};

/// Size of a record header in bytes.
pub(crate) const HEADER_LEN: u64 = 12;

/// Location of one record inside a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordLocation {
    /// Shard sequence number.
    pub(crate) shard: u32,
    /// Offset of the record header.
    pub(crate) offset: u64,
    /// Payload length.
    pub(crate) len: u32,
}

/// Encodes a record header.
pub(crate) fn header(block_number: u64, len: u32) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[..8].copy_from_slice(&block_number.to_be_bytes());
    header[8..].copy_from_slice(&len.to_be_bytes());
    header
}

fn parse_header(header: &[u8; HEADER_LEN as usize]) -> (u64, u32) {
    let mut number = [0u8; 8];
    let mut len = [0u8; 4];
    number.copy_from_slice(&header[..8]);
    len.copy_from_slice(&header[8..]);
    (u64::from_be_bytes(number), u32::from_be_bytes(len))
}

/// Result of scanning a shard's headers.
#[derive(Debug, Default)]
pub(crate) struct ShardScan {
    /// `(block number, location)` of every complete record, in file order.
    pub(crate) records: Vec<(u64, RecordLocation)>,
    /// Length of the prefix made of complete records.
    pub(crate) valid_len: u64,
}

/// Walks the record headers of a shard without reading payloads.
///
/// Stops at the first record that runs past the end of the file or has an empty payload.
/// Encoded blocks are never empty, so a zero length marks a tail the filesystem extended
/// with zeros before the record was written.
pub(crate) fn scan(file: &File, shard: u32) -> Result<ShardScan, StorageError> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;

    let mut scan = ShardScan::default();
    let mut offset = 0u64;
    let mut buf = [0u8; HEADER_LEN as usize];

    while offset + HEADER_LEN <= file_len {
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }

        let (block_number, len) = parse_header(&buf);
        if len == 0 {
            break;
        }
        let end = offset + HEADER_LEN + u64::from(len);
        if end > file_len {
            break;
        }

        scan.records.push((block_number, RecordLocation { shard, offset, len }));
        reader.seek_relative(i64::from(len))?;
        offset = end;
    }

    scan.valid_len = offset;
    Ok(scan)
}

/// Reads the payload at `location`, checking the header against `block_number`.
pub(crate) fn read_payload(
    file: &mut File,
    block_number: u64,
    location: RecordLocation,
) -> Result<Vec<u8>, StorageError> {
    file.seek(SeekFrom::Start(location.offset))?;

    let mut buf = [0u8; HEADER_LEN as usize];
    file.read_exact(&mut buf)?;
    let (stored_number, len) = parse_header(&buf);
    if stored_number != block_number || len != location.len {
        return Err(StorageError::Corrupted(format!(
            "record at offset {} of shard {} holds block {stored_number}, expected {block_number}",
            location.offset, location.shard
        )));
    }

    let mut payload = vec![0u8; len as usize];
    file.read_exact(&mut payload)?;
    Ok(payload)
}
