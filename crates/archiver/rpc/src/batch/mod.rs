//! Request batching.

mod client;
pub use client::BatchRpcClient;

mod sizing;
pub use sizing::AdaptiveBatchSize;

use std::time::Duration;

/// Default maximum number of calls per batch.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default flush interval.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration of a [`BatchRpcClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of calls per batch.
    pub max_batch_size: usize,
    /// Interval between flushes.
    pub interval: Duration,
    /// Whether the batch size adapts to errors.
    pub adaptive: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_batch_size: DEFAULT_BATCH_SIZE, interval: DEFAULT_BATCH_INTERVAL, adaptive: false }
    }
}
