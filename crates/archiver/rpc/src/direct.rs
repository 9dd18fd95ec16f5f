//! Unbatched client.

use crate::{
    BatchTransport, RateLimiter, RpcCall, RpcError,
    jsonrpc::{Request, ResponsePacket},
    metrics::Metrics,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Sends one HTTP request per call, each after waiting on the shared [`RateLimiter`].
#[derive(Debug)]
pub struct DirectRpcClient<T> {
    transport: Arc<T>,
    limiter: Arc<RateLimiter>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for DirectRpcClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            limiter: Arc::clone(&self.limiter),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> DirectRpcClient<T>
where
    T: BatchTransport,
{
    /// Creates a new [`DirectRpcClient`].
    pub fn new(transport: T, limiter: Arc<RateLimiter>) -> Self {
        Self { transport: Arc::new(transport), limiter, next_id: Arc::new(AtomicU64::new(0)) }
    }

    /// Sends a single call and waits for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.limiter.acquire().await;
        Metrics::record_direct_request();

        let request = Value::from(Request::new(id, method.to_string(), params));
        let body = self.transport.post(request).await?;
        let response = ResponsePacket::from_value(body)?
            .into_responses()
            .into_iter()
            .find(|response| response.id().is_none_or(|response_id| response_id == id))
            .ok_or(RpcError::MissingResponse(id))?;
        response.into_result()
    }
}

#[async_trait]
impl<T> RpcCall for DirectRpcClient<T>
where
    T: BatchTransport + Debug,
{
    async fn call_raw(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        self.call(method, params).await
    }
}
