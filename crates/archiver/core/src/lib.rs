#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod buffer;
pub use buffer::BlockBuffer;

mod committer;
pub use committer::{CommitSummary, Committer};

mod config;
pub use config::{
    ArchiverConfig, ConfigError, DEFAULT_DEBUG_CONCURRENCY, DEFAULT_HEAD_POLL_INTERVAL,
    DEFAULT_PREFETCH_WINDOW, DEFAULT_PROGRESS_INTERVAL, DEFAULT_RPC_CONCURRENCY,
    DEFAULT_START_BLOCK,
};

mod error;
pub use error::{ArchiverError, FetchError, ResumeError};

mod fetcher;
pub use fetcher::{BlockFetcher, INCORRECT_TOP_LEVEL_CALLS};

mod metrics;
pub use metrics::Metrics;

mod pipeline;
pub use pipeline::{ArchiveSummary, Archiver};

mod progress;
pub use progress::{Progress, ProgressReporter};

mod resume;
pub use resume::ResumeTracker;

mod scheduler;
pub use scheduler::Scheduler;

mod traits;
pub use traits::BlockSource;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
