#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod api;
pub use api::{EthApi, RpcCall};

mod batch;
pub use batch::{
    AdaptiveBatchSize, BatchConfig, BatchRpcClient, DEFAULT_BATCH_INTERVAL, DEFAULT_BATCH_SIZE,
};

mod direct;
pub use direct::DirectRpcClient;

mod error;
pub use error::{RpcError, TransportError};

pub mod jsonrpc;

mod limiter;
pub use limiter::RateLimiter;

mod metrics;
pub use metrics::Metrics;

mod transport;
pub use transport::{BatchTransport, HttpTransport};
