//! The batching client and its driver task.

use super::{AdaptiveBatchSize, BatchConfig};
use crate::{
    BatchTransport, RateLimiter, RpcCall, RpcError,
    jsonrpc::{Request, ResponsePacket},
    metrics::Metrics,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::VecDeque, sync::Arc};
use tokio::{
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};

/// A call waiting in the queue.
#[derive(Debug)]
struct PendingCall {
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, RpcError>>,
}

/// Handle to a batching JSON-RPC client.
///
/// Calls from any number of tasks are queued and sent as JSON-RPC batch arrays by a
/// single driver task. Cloning the handle is cheap. Once every handle is dropped the
/// driver flushes the remaining queue and exits.
#[derive(Debug, Clone)]
pub struct BatchRpcClient {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl BatchRpcClient {
    /// Spawns the driver task on the current tokio runtime and returns a handle to it.
    pub fn spawn<T>(transport: T, config: BatchConfig, limiter: Arc<RateLimiter>) -> Self
    where
        T: BatchTransport + 'static,
    {
        let (calls, queue) = mpsc::unbounded_channel();
        let driver = BatchDriver {
            transport,
            limiter,
            interval: config.interval,
            sizing: AdaptiveBatchSize::new(config.max_batch_size, config.adaptive),
            incoming: queue,
            queue: VecDeque::new(),
        };
        tokio::spawn(driver.run());
        Self { calls }
    }

    /// Queues a call and waits for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let (reply, result) = oneshot::channel();
        self.calls
            .send(PendingCall { method: method.to_string(), params, reply })
            .map_err(|_| RpcError::Closed)?;
        result.await.map_err(|_| RpcError::Closed)?
    }
}

#[async_trait]
impl RpcCall for BatchRpcClient {
    async fn call_raw(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        self.call(method, params).await
    }
}

/// Drains the queue into batches, one batch in flight at a time.
#[derive(Debug)]
struct BatchDriver<T> {
    transport: T,
    limiter: Arc<RateLimiter>,
    interval: std::time::Duration,
    sizing: AdaptiveBatchSize,
    incoming: mpsc::UnboundedReceiver<PendingCall>,
    queue: VecDeque<PendingCall>,
}

impl<T> BatchDriver<T>
where
    T: BatchTransport,
{
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        // A tick that lands while a batch is in flight is dropped, not queued up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut closed = false;
        loop {
            ticker.tick().await;

            if !closed {
                closed = self.collect_incoming();
            }
            if self.queue.is_empty() {
                if closed {
                    break;
                }
                continue;
            }

            let take = self.sizing.current().min(self.queue.len());
            let batch: Vec<PendingCall> = self.queue.drain(..take).collect();

            self.limiter.acquire().await;
            self.dispatch(batch).await;
        }

        debug!(target: "batch_rpc", "All client handles dropped, batch driver exiting");
    }

    /// Moves newly submitted calls into the queue. Returns `true` once every handle is gone.
    fn collect_incoming(&mut self) -> bool {
        loop {
            match self.incoming.try_recv() {
                Ok(call) => self.queue.push_back(call),
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    async fn dispatch(&mut self, batch: Vec<PendingCall>) {
        let size = batch.len();
        let (requests, replies): (Vec<Value>, Vec<_>) = batch
            .into_iter()
            .enumerate()
            .map(|(id, call)| {
                (Value::from(Request::new(id as u64, call.method, call.params)), call.reply)
            })
            .unzip();

        Metrics::record_batch_sent(size);
        trace!(target: "batch_rpc", size, "Sending batch");

        let packet = match self.transport.post(Value::Array(requests)).await {
            Ok(body) => ResponsePacket::from_value(body),
            Err(err) => Err(err),
        };

        let clean = match packet {
            Ok(packet) => Self::demux(packet, replies),
            Err(err) => {
                warn!(target: "batch_rpc", size, %err, "Batch request failed");
                let err = RpcError::from(err);
                for reply in replies {
                    let _ = reply.send(Err(err.clone()));
                }
                false
            }
        };

        if clean {
            self.sizing.on_success();
        } else {
            Metrics::record_batch_error();
            self.sizing.on_error();
        }
        Metrics::set_batch_size(self.sizing.current());
    }

    /// Routes each response to the caller whose request carried its id. Returns `true` if
    /// every call in the batch succeeded.
    fn demux(
        packet: ResponsePacket,
        replies: Vec<oneshot::Sender<Result<Value, RpcError>>>,
    ) -> bool {
        let mut pending: Vec<_> = replies.into_iter().map(Some).collect();
        let mut clean = true;

        for response in packet.into_responses() {
            let Some(id) = response.id() else {
                // An error that cannot be attributed to one call applies to the whole batch.
                let err = match response.into_result() {
                    Err(err) => err,
                    Ok(_) => {
                        warn!(target: "batch_rpc", "Ignoring response without an id");
                        continue;
                    }
                };
                warn!(target: "batch_rpc", %err, "Batch rejected by the node");
                for reply in pending.iter_mut().filter_map(Option::take) {
                    let _ = reply.send(Err(err.clone()));
                }
                clean = false;
                continue;
            };

            let slot = usize::try_from(id).ok().and_then(|index| pending.get_mut(index));
            let Some(reply) = slot.and_then(Option::take) else {
                warn!(target: "batch_rpc", id, "Ignoring response with an unknown or repeated id");
                continue;
            };

            let result = response.into_result();
            clean &= result.is_ok();
            let _ = reply.send(result);
        }

        for (id, reply) in pending.into_iter().enumerate() {
            if let Some(reply) = reply {
                clean = false;
                let _ = reply.send(Err(RpcError::MissingResponse(id as u64)));
            }
        }

        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EthApi, TransportError};
    use alloy_primitives::{Address, B256};
    use futures::future::join_all;
    use serde_json::json;
    use std::{num::NonZeroU32, sync::Mutex, time::Duration};
    use tokio::time::Instant;

    /// Answers every request with its params, except for methods listed as failing.
    #[derive(Debug, Default)]
    struct EchoTransport {
        failing_methods: Vec<&'static str>,
        fail_http: bool,
        batches: Mutex<Vec<(Instant, usize)>>,
        latency: Duration,
    }

    #[async_trait]
    impl BatchTransport for EchoTransport {
        async fn post(&self, body: Value) -> Result<Value, TransportError> {
            let requests = body.as_array().cloned().unwrap_or_default();
            self.batches.lock().unwrap().push((Instant::now(), requests.len()));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.fail_http {
                return Err(TransportError::Status { status: 503, body: "unavailable".into() });
            }

            // Answer in reverse to prove routing is by id, not position.
            let responses = requests
                .iter()
                .rev()
                .map(|request| {
                    let method = request["method"].as_str().unwrap_or_default();
                    if self.failing_methods.contains(&method) {
                        json!({ "jsonrpc": "2.0", "id": request["id"], "error": { "code": -32000, "message": "nope" } })
                    } else {
                        json!({ "jsonrpc": "2.0", "id": request["id"], "result": request["params"] })
                    }
                })
                .collect();
            Ok(Value::Array(responses))
        }
    }

    /// Returns a fixed body for every batch.
    #[derive(Debug)]
    struct FixedTransport(Value);

    #[async_trait]
    impl BatchTransport for FixedTransport {
        async fn post(&self, _body: Value) -> Result<Value, TransportError> {
            Ok(self.0.clone())
        }
    }

    fn config(max_batch_size: usize) -> BatchConfig {
        BatchConfig { max_batch_size, interval: Duration::from_millis(50), adaptive: false }
    }

    fn unlimited() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::unlimited())
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_demux_isolates_failed_call() {
        let transport = Arc::new(EchoTransport {
            failing_methods: vec!["fail"],
            ..Default::default()
        });
        let client = BatchRpcClient::spawn(Arc::clone(&transport), config(25), unlimited());

        let calls = (0..10).map(|i| {
            let client = client.clone();
            async move {
                let method = if i == 4 { "fail" } else { "echo" };
                client.call(method, json!([i])).await
            }
        });
        let results = join_all(calls).await;

        for (i, result) in results.into_iter().enumerate() {
            if i == 4 {
                assert!(matches!(result, Err(RpcError::ErrorResponse { code: -32000, .. })));
            } else {
                assert_eq!(result.unwrap(), json!([i]));
            }
        }
        assert_eq!(transport.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_failure_rejects_whole_batch() {
        let transport = EchoTransport { fail_http: true, ..Default::default() };
        let client = BatchRpcClient::spawn(transport, config(25), unlimited());

        let results = join_all((0..5).map(|i| {
            let client = client.clone();
            async move { client.call("echo", json!([i])).await }
        }))
        .await;

        for result in results {
            assert!(matches!(
                result,
                Err(RpcError::Transport(TransportError::Status { status: 503, .. }))
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_respect_max_size_and_fifo() {
        let transport = Arc::new(EchoTransport::default());
        let client = BatchRpcClient::spawn(Arc::clone(&transport), config(4), unlimited());

        let results = join_all((0..10).map(|i| {
            let client = client.clone();
            async move { client.call("echo", json!([i])).await }
        }))
        .await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), json!([i]));
        }
        let sizes: Vec<usize> =
            transport.batches.lock().unwrap().iter().map(|(_, size)| *size).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_batch_in_flight() {
        let transport = Arc::new(EchoTransport {
            latency: Duration::from_millis(200),
            ..Default::default()
        });
        let client = BatchRpcClient::spawn(Arc::clone(&transport), config(1), unlimited());

        join_all((0..3).map(|i| {
            let client = client.clone();
            async move { client.call("echo", json!([i])).await }
        }))
        .await;

        let batches = transport.batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 3);
        for pair in batches.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_rate_ceiling() {
        let transport = Arc::new(EchoTransport::default());
        let limiter = Arc::new(RateLimiter::new(NonZeroU32::new(4).unwrap()));
        let client = BatchRpcClient::spawn(Arc::clone(&transport), config(1), limiter);

        join_all((0..9).map(|i| {
            let client = client.clone();
            async move { client.call("echo", json!([i])).await }
        }))
        .await;

        let batches = transport.batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 9);
        // No one-second window holds more than four flushes.
        for window in batches.windows(5) {
            assert!(window[4].0 - window[0].0 >= Duration::from_millis(999));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_and_unknown_ids() {
        let client = BatchRpcClient::spawn(
            FixedTransport(json!([
                { "jsonrpc": "2.0", "id": 0, "result": "0x1" },
                { "jsonrpc": "2.0", "id": 9, "result": "0x9" }
            ])),
            config(25),
            unlimited(),
        );

        let (first, second) =
            tokio::join!(client.call("a", json!([])), client.call("b", json!([])));
        assert_eq!(first.unwrap(), json!("0x1"));
        assert!(matches!(second, Err(RpcError::MissingResponse(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deeply_nested_result_reaches_its_caller() {
        let depth = 600;
        let mut trace = json!({ "type": "STOP", "from": Address::repeat_byte(0x02) });
        for _ in 1..depth {
            trace = json!({ "type": "CALL", "from": Address::repeat_byte(0x01), "calls": [trace] });
        }
        let client = BatchRpcClient::spawn(
            FixedTransport(json!([
                { "jsonrpc": "2.0", "id": 1, "result": "0xa" },
                { "jsonrpc": "2.0", "id": 0, "result": trace }
            ])),
            config(25),
            unlimited(),
        );

        let (traced, chain_id) =
            tokio::join!(client.trace_transaction(B256::repeat_byte(0x01)), client.chain_id());
        assert_eq!(traced.unwrap().max_depth(), depth);
        assert_eq!(chain_id.unwrap(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_null_id_error_rejects_every_caller() {
        let client = BatchRpcClient::spawn(
            FixedTransport(json!({
                "jsonrpc": "2.0", "id": null, "error": { "code": -32600, "message": "invalid request" }
            })),
            config(25),
            unlimited(),
        );

        let (first, second) =
            tokio::join!(client.call("a", json!([])), client.call("b", json!([])));
        for result in [first, second] {
            assert!(matches!(result, Err(RpcError::ErrorResponse { code: -32600, .. })));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_exits_after_handles_drop() {
        let transport = Arc::new(EchoTransport::default());
        let client = BatchRpcClient::spawn(Arc::clone(&transport), config(25), unlimited());
        let result = client.call("echo", json!([1])).await;
        assert_eq!(result.unwrap(), json!([1]));

        drop(client);
        tokio::time::sleep(Duration::from_millis(200)).await;
        // The driver held the only other reference to the transport.
        assert_eq!(Arc::strong_count(&transport), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_size_shrinks_on_errors() {
        let transport = Arc::new(EchoTransport {
            failing_methods: vec!["fail"],
            ..Default::default()
        });
        let client = BatchRpcClient::spawn(
            Arc::clone(&transport),
            BatchConfig { max_batch_size: 8, interval: Duration::from_millis(50), adaptive: true },
            unlimited(),
        );

        // First batch of 8 carries a failure, so the next batch holds at most 4.
        let results = join_all((0..16).map(|i| {
            let client = client.clone();
            async move {
                let method = if i == 0 { "fail" } else { "echo" };
                client.call(method, json!([i])).await
            }
        }))
        .await;
        assert!(results[0].is_err());
        assert!(results[1..].iter().all(Result::is_ok));

        let sizes: Vec<usize> =
            transport.batches.lock().unwrap().iter().map(|(_, size)| *size).collect();
        assert_eq!(sizes[0], 8);
        assert_eq!(sizes[1], 4);
        assert_eq!(sizes[2], 4);
    }
}
