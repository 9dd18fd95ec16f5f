//! Storage flags.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which sink backs the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Append-only shard files plus a watermark file.
    #[default]
    Files,
    /// An MDBX database holding both blocks and the watermark.
    Mdbx,
    /// Process memory. Nothing survives a restart.
    Memory,
}

/// Storage arguments.
#[derive(Parser, Clone, Debug)]
pub struct StorageArgs {
    /// Root directory of the archive. Each chain gets a subdirectory named after its id.
    #[arg(long = "data-dir", env = "DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,
    /// Sink the archive is written to.
    #[arg(long, env = "SINK", value_enum, default_value_t = SinkKind::Files, global = true)]
    pub sink: SinkKind,
    /// Size in MiB at which a shard file is sealed and a new one started.
    #[arg(long = "shard-size-mb", env = "SHARD_SIZE_MB", default_value_t = 128, global = true)]
    pub shard_size_mb: u64,
}

impl Default for StorageArgs {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data"), sink: SinkKind::Files, shard_size_mb: 128 }
    }
}

impl StorageArgs {
    /// Directory holding the archive of `chain_id`.
    pub fn chain_dir(&self, chain_id: u64) -> PathBuf {
        self.data_dir.join(chain_id.to_string())
    }

    /// Shard size limit in bytes.
    pub const fn max_shard_bytes(&self) -> u64 {
        self.shard_size_mb.saturating_mul(1024 * 1024)
    }
}
