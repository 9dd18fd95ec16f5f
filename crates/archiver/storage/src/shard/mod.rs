//! Append-only sharded file sink.
//!
//! Blocks are appended to numbered shard files (`000000.shard`, `000001.shard`, ...) in a
//! single directory. A new shard is started once the current one exceeds the size cutoff.
//! Rewriting a block appends a new record; the last record for a number wins. The index
//! of record locations is rebuilt from the record headers when the sink is opened.

mod record;
use record::{HEADER_LEN, RecordLocation, header, read_payload, scan};

use crate::{BlockReader, BlockSink, StorageError, codec, traits::ensure_number};
use archiver_primitives::ArchivedBlock;
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, info, warn};

/// File extension of shard files.
pub const SHARD_EXTENSION: &str = "shard";

/// Default size after which a new shard is started.
pub const DEFAULT_MAX_SHARD_BYTES: u64 = 128 * 1024 * 1024;

/// The shard currently appended to.
#[derive(Debug)]
struct ActiveShard {
    seq: u32,
    file: File,
    len: u64,
}

#[derive(Debug)]
struct ShardState {
    index: BTreeMap<u64, RecordLocation>,
    active: Option<ActiveShard>,
    next_seq: u32,
}

/// A [`BlockSink`] writing zstd compressed blocks into size-capped shard files.
#[derive(Debug)]
pub struct ShardedFileSink {
    dir: PathBuf,
    max_shard_bytes: u64,
    state: Mutex<ShardState>,
}

impl ShardedFileSink {
    /// Opens or creates a sink in `dir`.
    ///
    /// Scans the headers of every existing shard to rebuild the index and truncates a torn
    /// trailing record left by an interrupted write.
    pub fn open(dir: impl AsRef<Path>, max_shard_bytes: u64) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let shards = list_shards(&dir)?;
        let mut index = BTreeMap::new();
        let mut active = None;

        for (position, seq) in shards.iter().enumerate() {
            let path = shard_path(&dir, *seq);
            let file = OpenOptions::new().read(true).append(true).open(&path)?;
            let scanned = scan(&file, *seq)?;

            let file_len = file.metadata()?.len();
            if scanned.valid_len < file_len {
                warn!(
                    target: "storage",
                    shard = %path.display(),
                    valid_len = scanned.valid_len,
                    file_len,
                    "Truncating torn record"
                );
                file.set_len(scanned.valid_len)?;
                file.sync_all()?;
            }

            for (block_number, location) in scanned.records {
                index.insert(block_number, location);
            }

            if position + 1 == shards.len() && scanned.valid_len < max_shard_bytes {
                active = Some(ActiveShard { seq: *seq, file, len: scanned.valid_len });
            }
        }

        let next_seq = shards.last().map_or(0, |seq| seq + 1);
        info!(
            target: "storage",
            dir = %dir.display(),
            shards = shards.len(),
            blocks = index.len(),
            "Opened sharded file sink"
        );

        Ok(Self { dir, max_shard_bytes, state: Mutex::new(ShardState { index, active, next_seq }) })
    }

    /// Returns the directory holding the shards.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the number of distinct blocks stored.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.state.lock()?.index.len())
    }

    /// Returns `true` if no block is stored.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Starts a new shard file.
    fn roll(&self, state: &mut ShardState) -> Result<(), StorageError> {
        let seq = state.next_seq;
        let path = shard_path(&self.dir, seq);
        let file = OpenOptions::new().read(true).append(true).create_new(true).open(&path)?;
        sync_dir(&self.dir)?;

        debug!(target: "storage", shard = %path.display(), "Started new shard");
        state.active = Some(ActiveShard { seq, file, len: 0 });
        state.next_seq = seq + 1;
        Ok(())
    }
}

impl BlockSink for ShardedFileSink {
    fn store(&self, block_number: u64, block: &ArchivedBlock) -> Result<(), StorageError> {
        ensure_number(block_number, block)?;

        let payload = codec::encode(block)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            StorageError::Codec(format!(
                "block {block_number} payload of {} bytes exceeds the record limit",
                payload.len()
            ))
        })?;

        let mut state = self.state.lock()?;
        let needs_roll =
            state.active.as_ref().is_none_or(|active| active.len >= self.max_shard_bytes);
        if needs_roll {
            self.roll(&mut state)?;
        }
        let Some(active) = state.active.as_mut() else {
            return Err(StorageError::Corrupted("no active shard".to_string()));
        };

        let offset = active.len;
        let written = active
            .file
            .write_all(&header(block_number, len))
            .and_then(|_| active.file.write_all(&payload))
            .and_then(|_| active.file.sync_data());

        if let Err(err) = written {
            // Cut the partial record so later appends stay aligned.
            if active.file.set_len(offset).and_then(|_| active.file.sync_data()).is_err() {
                state.active = None;
            }
            return Err(err.into());
        }

        active.len = offset + HEADER_LEN + u64::from(len);
        let location = RecordLocation { shard: active.seq, offset, len };
        state.index.insert(block_number, location);
        Ok(())
    }

    fn last_stored_block_number(&self) -> Result<u64, StorageError> {
        let state = self.state.lock()?;
        state
            .index
            .last_key_value()
            .map(|(number, _)| *number)
            .ok_or_else(|| StorageError::EntryNotFound("no blocks stored".to_string()))
    }
}

impl BlockReader for ShardedFileSink {
    fn read_block(&self, block_number: u64) -> Result<ArchivedBlock, StorageError> {
        let location = self
            .state
            .lock()?
            .index
            .get(&block_number)
            .copied()
            .ok_or_else(|| StorageError::EntryNotFound(format!("block {block_number}")))?;

        let mut file = File::open(shard_path(&self.dir, location.shard))?;
        let payload = read_payload(&mut file, block_number, location)?;
        codec::decode(&payload)
    }
}

fn shard_path(dir: &Path, seq: u32) -> PathBuf {
    dir.join(format!("{seq:06}.{SHARD_EXTENSION}"))
}

/// Returns the sequence numbers of the shard files in `dir`, ascending.
fn list_shards(dir: &Path) -> Result<Vec<u32>, StorageError> {
    let mut shards = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SHARD_EXTENSION) {
            continue;
        }
        if let Some(seq) = path.file_stem().and_then(|stem| stem.to_str()?.parse().ok()) {
            shards.push(seq);
        }
    }
    shards.sort_unstable();
    Ok(shards)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_blocks::block;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_store_read_and_reopen() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        {
            let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
            for number in 1..=5 {
                sink.store(number, &block(number, number as usize)).unwrap();
            }
            assert_eq!(sink.last_stored_block_number().unwrap(), 5);
        }

        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert_eq!(sink.len().unwrap(), 5);
        assert_eq!(sink.last_stored_block_number().unwrap(), 5);
        for number in 1..=5 {
            assert_eq!(sink.read_block(number).unwrap(), block(number, number as usize));
        }
    }

    #[test]
    fn test_rewrite_last_record_wins() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();

        sink.store(3, &block(3, 1)).unwrap();
        sink.store(3, &block(3, 2)).unwrap();
        assert_eq!(sink.len().unwrap(), 1);
        assert_eq!(sink.read_block(3).unwrap(), block(3, 2));

        drop(sink);
        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert_eq!(sink.read_block(3).unwrap(), block(3, 2));
    }

    #[test]
    fn test_rollover_by_size() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        // Every record exceeds the cutoff, so each lands in its own shard.
        let sink = ShardedFileSink::open(tmp_dir.path(), 1).unwrap();
        for number in 1..=3 {
            sink.store(number, &block(number, 0)).unwrap();
        }

        let shards = list_shards(tmp_dir.path()).unwrap();
        assert_eq!(shards, vec![0, 1, 2]);

        drop(sink);
        let sink = ShardedFileSink::open(tmp_dir.path(), 1).unwrap();
        sink.store(4, &block(4, 0)).unwrap();
        assert_eq!(list_shards(tmp_dir.path()).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(sink.read_block(2).unwrap(), block(2, 0));
    }

    #[test]
    fn test_max_scan_after_out_of_order_writes() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        sink.store(10, &block(10, 0)).unwrap();
        sink.store(4, &block(4, 0)).unwrap();
        drop(sink);

        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert_eq!(sink.last_stored_block_number().unwrap(), 10);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        sink.store(1, &block(1, 1)).unwrap();
        sink.store(2, &block(2, 1)).unwrap();
        drop(sink);

        let path = shard_path(tmp_dir.path(), 0);
        let intact_len = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&header(3, 1_000)).unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        drop(file);

        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
        assert_eq!(sink.last_stored_block_number().unwrap(), 2);

        sink.store(3, &block(3, 1)).unwrap();
        drop(sink);
        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert_eq!(sink.read_block(3).unwrap(), block(3, 1));
    }

    #[test]
    fn test_zero_extended_tail_is_truncated() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        sink.store(1, &block(1, 1)).unwrap();
        drop(sink);

        let path = shard_path(tmp_dir.path(), 0);
        let intact_len = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0u8; 4 * HEADER_LEN as usize]).unwrap();
        drop(file);

        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
        assert_eq!(sink.len().unwrap(), 1);
        assert!(sink.read_block(0).unwrap_err().is_not_found());

        sink.store(2, &block(2, 1)).unwrap();
        assert_eq!(sink.read_block(2).unwrap(), block(2, 1));
    }

    #[test]
    fn test_empty_sink() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert!(sink.last_stored_block_number().unwrap_err().is_not_found());
        assert!(sink.read_block(1).unwrap_err().is_not_found());
        assert!(sink.is_empty().unwrap());
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        fs::write(tmp_dir.path().join("watermark"), b"12").unwrap();
        fs::write(tmp_dir.path().join("notes.shard"), b"").unwrap();

        let sink = ShardedFileSink::open(tmp_dir.path(), DEFAULT_MAX_SHARD_BYTES).unwrap();
        assert!(sink.is_empty().unwrap());
        sink.store(1, &block(1, 0)).unwrap();
        assert_eq!(sink.read_block(1).unwrap(), block(1, 0));
    }
}
