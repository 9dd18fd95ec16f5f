#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod codec;

mod error;
pub use error::StorageError;

mod traits;
pub use traits::{BlockReader, BlockSink, WatermarkStore};

mod memory;
pub use memory::MemorySink;

mod shard;
pub use shard::{DEFAULT_MAX_SHARD_BYTES, SHARD_EXTENSION, ShardedFileSink};

mod mdbx;
pub use mdbx::{ArchivedBlocks, MdbxSink, StoredBlock, StoredWatermark, Watermarks};

mod watermark;
pub use watermark::FileWatermark;
