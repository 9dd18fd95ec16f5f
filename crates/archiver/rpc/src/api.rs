//! Typed access to the node methods the archiver consumes.

use crate::RpcError;
use alloy_primitives::{B256, U64};
use archiver_primitives::{CallTrace, RpcBlock, RpcReceipt, TraceResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{fmt::Debug, sync::Arc};

/// Issues a single JSON-RPC call.
#[async_trait]
pub trait RpcCall: Debug + Send + Sync {
    /// Calls `method` with positional `params` and returns the raw result.
    async fn call_raw(&self, method: &'static str, params: Value) -> Result<Value, RpcError>;
}

#[async_trait]
impl<T> RpcCall for Arc<T>
where
    T: RpcCall + ?Sized,
{
    async fn call_raw(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        (**self).call_raw(method, params).await
    }
}

/// Tracer options passed to the `debug_trace*` methods.
fn call_tracer() -> Value {
    json!({ "tracer": "callTracer" })
}

fn decode<T: DeserializeOwned>(method: &'static str, value: Value) -> Result<T, RpcError> {
    archiver_primitives::json::from_value(value)
        .map_err(|err| RpcError::Decode { method, reason: err.to_string() })
}

/// The `eth_*` and `debug_*` methods used by the archiver, available on every [`RpcCall`].
#[async_trait]
pub trait EthApi: RpcCall {
    /// `eth_chainId`.
    async fn chain_id(&self) -> Result<u64, RpcError> {
        let id: U64 = decode("eth_chainId", self.call_raw("eth_chainId", json!([])).await?)?;
        Ok(id.to())
    }

    /// `eth_blockNumber`.
    async fn block_number(&self) -> Result<u64, RpcError> {
        let number: U64 =
            decode("eth_blockNumber", self.call_raw("eth_blockNumber", json!([])).await?)?;
        Ok(number.to())
    }

    /// `eth_getBlockByNumber` with full transactions. `None` if the node has no such block.
    async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>, RpcError> {
        let params = json!([U64::from(number), true]);
        decode("eth_getBlockByNumber", self.call_raw("eth_getBlockByNumber", params).await?)
    }

    /// `eth_getTransactionReceipt`. `None` if the node has not indexed the receipt.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        let params = json!([hash]);
        decode(
            "eth_getTransactionReceipt",
            self.call_raw("eth_getTransactionReceipt", params).await?,
        )
    }

    /// `debug_traceBlockByNumber` with the call tracer.
    async fn trace_block_by_number(&self, number: u64) -> Result<Vec<TraceResult>, RpcError> {
        let params = json!([U64::from(number), call_tracer()]);
        decode(
            "debug_traceBlockByNumber",
            self.call_raw("debug_traceBlockByNumber", params).await?,
        )
    }

    /// `debug_traceTransaction` with the call tracer.
    async fn trace_transaction(&self, hash: B256) -> Result<CallTrace, RpcError> {
        let params = json!([hash, call_tracer()]);
        decode("debug_traceTransaction", self.call_raw("debug_traceTransaction", params).await?)
    }
}

impl<T> EthApi for T where T: RpcCall + ?Sized {}
