//! Pipeline configuration.

use alloy_primitives::B256;
use std::{collections::HashSet, time::Duration};

/// Default first block archived from an empty sink.
pub const DEFAULT_START_BLOCK: u64 = 1;

/// Default number of blocks ahead of the commit point that may be fetched.
pub const DEFAULT_PREFETCH_WINDOW: usize = 500;

/// Default ceiling on concurrent plain RPC calls issued by the fetcher.
pub const DEFAULT_RPC_CONCURRENCY: usize = 300;

/// Default ceiling on concurrent trace calls issued by the fetcher.
pub const DEFAULT_DEBUG_CONCURRENCY: usize = 40;

/// Default interval between chain head polls.
pub const DEFAULT_HEAD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Errors from [`ArchiverConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A limit that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    /// The end block lies before the start block.
    #[error("end block {end} is before start block {start}")]
    EndBeforeStart {
        /// Configured start block.
        start: u64,
        /// Configured end block.
        end: u64,
    },
}

/// Configuration of an [`crate::Archiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiverConfig {
    /// First block to archive when neither the sink nor the watermark has a position.
    pub start_block: u64,
    /// Last block to archive. Runs indefinitely, following the head, when `None`.
    pub end_block: Option<u64>,
    /// How many blocks ahead of the commit point may be fetched or buffered.
    pub prefetch_window: usize,
    /// Ceiling on concurrently running block fetches.
    pub max_concurrent: usize,
    /// Ceiling on concurrent block and receipt calls.
    pub rpc_concurrency: usize,
    /// Ceiling on concurrent trace calls.
    pub debug_concurrency: usize,
    /// Whether to collect call traces.
    pub include_traces: bool,
    /// Transactions whose traces the node cannot produce. They are archived without one.
    pub known_bad_traces: HashSet<B256>,
    /// Whether each committed block must link to the previous one by parent hash.
    pub verify_parent_hash: bool,
    /// Interval between chain head polls.
    pub head_poll_interval: Duration,
    /// Delay before a failed fetch is reissued.
    pub retry_delay: Duration,
    /// How many times a failed sink or watermark write is retried before giving up.
    pub write_retries: usize,
    /// First backoff delay between write retries. Doubles on every attempt.
    pub write_retry_delay: Duration,
    /// Interval between progress reports.
    pub progress_interval: Duration,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            start_block: DEFAULT_START_BLOCK,
            end_block: None,
            prefetch_window: DEFAULT_PREFETCH_WINDOW,
            max_concurrent: DEFAULT_PREFETCH_WINDOW,
            rpc_concurrency: DEFAULT_RPC_CONCURRENCY,
            debug_concurrency: DEFAULT_DEBUG_CONCURRENCY,
            include_traces: false,
            known_bad_traces: HashSet::new(),
            verify_parent_hash: false,
            head_poll_interval: DEFAULT_HEAD_POLL_INTERVAL,
            retry_delay: Duration::from_millis(100),
            write_retries: 5,
            write_retry_delay: Duration::from_millis(200),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl ArchiverConfig {
    /// Checks limits and the block range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefetch_window == 0 {
            return Err(ConfigError::Zero("prefetch window"));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Zero("max concurrent fetches"));
        }
        if self.rpc_concurrency == 0 {
            return Err(ConfigError::Zero("rpc concurrency"));
        }
        if self.debug_concurrency == 0 {
            return Err(ConfigError::Zero("debug concurrency"));
        }
        if let Some(end) = self.end_block &&
            end < self.start_block
        {
            return Err(ConfigError::EndBeforeStart { start: self.start_block, end });
        }
        Ok(())
    }
}
