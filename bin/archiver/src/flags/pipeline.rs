//! Pipeline flags.

use alloy_primitives::B256;
use archiver_core::{
    ArchiverConfig, DEFAULT_DEBUG_CONCURRENCY, DEFAULT_PREFETCH_WINDOW, DEFAULT_RPC_CONCURRENCY,
    DEFAULT_START_BLOCK,
};
use clap::{ArgAction, Parser, builder::FalseyValueParser};
use std::time::Duration;

/// Arguments shaping the archival pipeline.
#[derive(Parser, Clone, Debug)]
pub struct PipelineArgs {
    /// First block to archive into an empty sink.
    #[arg(long = "start-block", env = "START_BLOCK", default_value_t = DEFAULT_START_BLOCK)]
    pub start_block: u64,
    /// Last block to archive. Follows the chain head forever when unset.
    #[arg(long = "end-block", env = "END_BLOCK")]
    pub end_block: Option<u64>,
    /// How many blocks past the commit point may be fetched ahead.
    #[arg(
        long = "prefetch-window",
        env = "PREFETCH_WINDOW",
        default_value_t = DEFAULT_PREFETCH_WINDOW
    )]
    pub prefetch_window: usize,
    /// Ceiling on block fetches in flight.
    #[arg(
        long = "max-concurrent",
        env = "MAX_CONCURRENT",
        default_value_t = DEFAULT_PREFETCH_WINDOW
    )]
    pub max_concurrent: usize,
    /// Ceiling on concurrent block and receipt calls.
    #[arg(
        long = "rpc-concurrency",
        env = "RPC_CONCURRENCY",
        default_value_t = DEFAULT_RPC_CONCURRENCY
    )]
    pub rpc_concurrency: usize,
    /// Ceiling on concurrent trace calls.
    #[arg(
        long = "debug-concurrency",
        env = "DEBUG_CONCURRENCY",
        default_value_t = DEFAULT_DEBUG_CONCURRENCY
    )]
    pub debug_concurrency: usize,
    /// Collects call traces for every transaction.
    #[arg(
        long = "include-traces",
        env = "INCLUDE_TRACES",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub include_traces: bool,
    /// Transactions the node cannot trace. They are archived without a trace.
    #[arg(long = "known-bad-traces", env = "KNOWN_BAD_TRACES", value_delimiter = ',')]
    pub known_bad_traces: Vec<B256>,
    /// Refuses to commit a block whose parent hash differs from the previous block's hash.
    #[arg(
        long = "verify-parent-hash",
        env = "VERIFY_PARENT_HASH",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub verify_parent_hash: bool,
    /// Interval between chain head polls, in milliseconds.
    #[arg(long = "head-poll-interval-ms", env = "HEAD_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub head_poll_interval_ms: u64,
    /// Interval between progress reports, in seconds.
    #[arg(long = "progress-interval-secs", env = "PROGRESS_INTERVAL_SECS", default_value_t = 10)]
    pub progress_interval_secs: u64,
}

impl PipelineArgs {
    /// Returns the [`ArchiverConfig`] described by the flags.
    pub fn config(&self) -> ArchiverConfig {
        ArchiverConfig {
            start_block: self.start_block,
            end_block: self.end_block,
            prefetch_window: self.prefetch_window,
            max_concurrent: self.max_concurrent,
            rpc_concurrency: self.rpc_concurrency,
            debug_concurrency: self.debug_concurrency,
            include_traces: self.include_traces,
            known_bad_traces: self.known_bad_traces.iter().copied().collect(),
            verify_parent_hash: self.verify_parent_hash,
            head_poll_interval: Duration::from_millis(self.head_poll_interval_ms),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library_defaults() {
        let args = PipelineArgs::try_parse_from(["test"]).unwrap();
        assert_eq!(args.config(), ArchiverConfig::default());
    }

    #[test]
    fn test_overrides() {
        let hash = B256::repeat_byte(0x11);
        let args = PipelineArgs::try_parse_from([
            "test",
            "--start-block",
            "100",
            "--end-block",
            "200",
            "--prefetch-window",
            "50",
            "--include-traces",
            "--known-bad-traces",
            &format!("{hash},{}", B256::repeat_byte(0x22)),
            "--head-poll-interval-ms",
            "250",
        ])
        .unwrap();

        let config = args.config();
        assert_eq!(config.start_block, 100);
        assert_eq!(config.end_block, Some(200));
        assert_eq!(config.prefetch_window, 50);
        assert!(config.include_traces);
        assert_eq!(config.known_bad_traces.len(), 2);
        assert!(config.known_bad_traces.contains(&hash));
        assert_eq!(config.head_poll_interval, Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_range_fails_validation() {
        let args =
            PipelineArgs::try_parse_from(["test", "--start-block", "10", "--end-block", "5"])
                .unwrap();
        assert!(args.config().validate().is_err());
    }
}
