//! RPC client flags.

use anyhow::Context as _;
use archiver_rpc::{
    BatchConfig, BatchRpcClient, DEFAULT_BATCH_INTERVAL, DEFAULT_BATCH_SIZE, DirectRpcClient,
    HttpTransport, RateLimiter, RpcCall,
};
use clap::{ArgAction, Parser, builder::{BoolishValueParser, FalseyValueParser}};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use url::Url;

/// RPC client arguments.
#[derive(Parser, Clone, Debug)]
pub struct RpcArgs {
    /// JSON-RPC endpoint of the node to archive from.
    #[arg(long = "rpc-url", env = "RPC_URL")]
    pub rpc_url: Url,
    /// Whether calls are coalesced into batch requests. Off sends one request per call.
    #[arg(
        long,
        env = "BATCHING",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub batching: bool,
    /// Maximum number of calls per batch request.
    #[arg(long = "batch-size", env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Interval between batch flushes, in milliseconds.
    #[arg(
        long = "batch-interval-ms",
        env = "BATCH_INTERVAL_MS",
        default_value_t = DEFAULT_BATCH_INTERVAL.as_millis() as u64
    )]
    pub batch_interval_ms: u64,
    /// Shrinks the batch size on failed batches and grows it back on successful ones.
    #[arg(
        long = "batch-size-growth",
        env = "BATCH_SIZE_GROWTH",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub batch_size_growth: bool,
    /// Maximum HTTP requests per second. Unlimited when unset.
    #[arg(long, env = "RPS")]
    pub rps: Option<NonZeroU32>,
    /// Timeout of a single HTTP request, in seconds.
    #[arg(long = "http-timeout-secs", env = "HTTP_TIMEOUT_SECS", default_value_t = 300)]
    pub http_timeout_secs: u64,
}

impl RpcArgs {
    /// Returns the [`BatchConfig`] described by the flags.
    pub fn batch_config(&self) -> anyhow::Result<BatchConfig> {
        anyhow::ensure!(self.batch_size > 0, "batch size must be greater than zero");
        Ok(BatchConfig {
            max_batch_size: self.batch_size,
            interval: Duration::from_millis(self.batch_interval_ms),
            adaptive: self.batch_size_growth,
        })
    }

    /// Builds the RPC client. Must be called from within a tokio runtime when batching is on.
    pub fn client(&self) -> anyhow::Result<Arc<dyn RpcCall>> {
        let transport =
            HttpTransport::new(self.rpc_url.clone(), Duration::from_secs(self.http_timeout_secs))
                .context("failed to build HTTP transport")?;
        let limiter = Arc::new(RateLimiter::from_rps(self.rps));

        if self.batching {
            let config = self.batch_config()?;
            info!(
                target: "archiver",
                url = %self.rpc_url,
                max_batch_size = config.max_batch_size,
                interval = ?config.interval,
                rps = ?self.rps,
                "Using batching RPC client"
            );
            Ok(Arc::new(BatchRpcClient::spawn(transport, config, limiter)))
        } else {
            info!(
                target: "archiver",
                url = %self.rpc_url,
                rps = ?self.rps,
                "Using direct RPC client"
            );
            Ok(Arc::new(DirectRpcClient::new(transport, limiter)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let args = RpcArgs::try_parse_from(["test", "--rpc-url", "http://localhost:8545"]).unwrap();
        assert!(args.batching);
        assert_eq!(args.batch_size, 25);
        assert_eq!(args.batch_interval_ms, 50);
        assert_eq!(args.http_timeout_secs, 300);
        assert_eq!(args.rps, None);
        assert!(!args.batch_config().unwrap().adaptive);
    }

    #[rstest]
    #[case("false", false)]
    #[case("0", false)]
    #[case("off", false)]
    #[case("true", true)]
    fn test_batching_toggle(#[case] value: &str, #[case] expected: bool) {
        let args = RpcArgs::try_parse_from([
            "test",
            "--rpc-url",
            "http://localhost:8545",
            "--batching",
            value,
        ])
        .unwrap();
        assert_eq!(args.batching, expected);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let args = RpcArgs::try_parse_from([
            "test",
            "--rpc-url",
            "http://localhost:8545",
            "--batch-size",
            "0",
        ])
        .unwrap();
        assert!(args.batch_config().is_err());
    }

    #[test]
    fn test_zero_rps_is_rejected() {
        assert!(
            RpcArgs::try_parse_from(["test", "--rpc-url", "http://localhost:8545", "--rps", "0"])
                .is_err()
        );
    }
}
