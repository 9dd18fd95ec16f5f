//! Test utilities: a deterministic in-process chain behind [`RpcCall`].

use crate::{BlockSource, FetchError};
use alloy_primitives::{Address, B256, Bytes, U64, U256};
use archiver_primitives::{
    ArchivedBlock, CallTrace, RpcBlock, RpcReceipt, RpcTransaction, TraceResult,
};
use archiver_rpc::{RpcCall, RpcError, TransportError};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error_response(code: i64, message: &str) -> RpcError {
    RpcError::ErrorResponse { code, message: message.to_string(), data: None }
}

fn param<T: DeserializeOwned>(params: &Value, index: usize) -> Result<T, RpcError> {
    params
        .get(index)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .ok_or_else(|| error_response(-32602, "invalid params"))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| error_response(-32603, &err.to_string()))
}

/// A chain of deterministic blocks served over [`RpcCall`].
///
/// Block `n` holds [`MockChain::tx_count`] transactions, links to block `n - 1` by parent
/// hash and exists for every `n <= head`. Faults are injected with the `with_*` builders.
#[derive(Debug, Default)]
pub struct MockChain {
    head: AtomicU64,
    chain_id: u64,
    latency: Option<Duration>,
    calls: Mutex<HashMap<&'static str, usize>>,
    block_requests: Mutex<HashMap<u64, usize>>,
    transient_failures: Mutex<HashMap<u64, usize>>,
    failing_block_traces: HashSet<u64>,
    untraceable: HashSet<B256>,
    without_transactions: HashSet<u64>,
    foreign_receipts: HashSet<u64>,
    unindexed_receipts: HashSet<u64>,
}

impl MockChain {
    /// Creates a chain whose head is `head`.
    pub fn new(head: u64) -> Self {
        Self { head: AtomicU64::new(head), chain_id: 1, ..Default::default() }
    }

    /// Number of transactions in block `block_number`.
    pub const fn tx_count(block_number: u64) -> usize {
        (block_number % 4) as usize + 1
    }

    /// Hash of block `block_number`.
    pub fn block_hash(block_number: u64) -> B256 {
        let mut bytes = [0xbb; 32];
        bytes[24..].copy_from_slice(&block_number.to_be_bytes());
        B256::from(bytes)
    }

    /// Hash of the `index`th transaction of block `block_number`.
    pub fn tx_hash(&self, block_number: u64, index: usize) -> B256 {
        Self::transaction_hash(block_number, index)
    }

    fn transaction_hash(block_number: u64, index: usize) -> B256 {
        let mut bytes = [0xaa; 32];
        bytes[..8].copy_from_slice(&block_number.to_be_bytes());
        bytes[8..16].copy_from_slice(&(index as u64).to_be_bytes());
        B256::from(bytes)
    }

    fn locate(tx_hash: B256) -> (u64, usize) {
        let mut number = [0; 8];
        let mut index = [0; 8];
        number.copy_from_slice(&tx_hash[..8]);
        index.copy_from_slice(&tx_hash[8..16]);
        (u64::from_be_bytes(number), u64::from_be_bytes(index) as usize)
    }

    /// Sets the chain id answered to `eth_chainId`.
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Delays every block request. The delay varies with the block number, so concurrent
    /// fetches complete out of order.
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes `debug_traceBlockByNumber` fail for `block_number`.
    pub fn with_failing_block_trace(mut self, block_number: u64) -> Self {
        self.failing_block_traces.insert(block_number);
        self
    }

    /// Makes `debug_traceTransaction` fail for `tx_hash` with the error of nodes that cannot
    /// trace it. Its block trace fails too.
    pub fn with_untraceable_tx(mut self, tx_hash: B256) -> Self {
        self.untraceable.insert(tx_hash);
        self
    }

    /// Serves block `block_number` without its transactions field.
    pub fn without_transactions_field(mut self, block_number: u64) -> Self {
        self.without_transactions.insert(block_number);
        self
    }

    /// Answers the receipt of the first transaction of `block_number` with the receipt of
    /// another transaction.
    pub fn with_foreign_receipt(mut self, block_number: u64) -> Self {
        self.foreign_receipts.insert(block_number);
        self
    }

    /// Makes the first `failures` requests for block `block_number` fail with an HTTP error.
    pub fn with_transient_failures(self, block_number: u64, failures: usize) -> Self {
        lock(&self.transient_failures).insert(block_number, failures);
        self
    }

    /// Answers `null` to receipt requests for the transactions of `block_number`.
    pub fn with_unindexed_receipts(mut self, block_number: u64) -> Self {
        self.unindexed_receipts.insert(block_number);
        self
    }

    /// Moves the chain head.
    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Returns how many times `method` was called.
    pub fn calls(&self, method: &str) -> usize {
        lock(&self.calls).get(method).copied().unwrap_or_default()
    }

    /// Returns how many times block `block_number` was requested.
    pub fn block_requests(&self, block_number: u64) -> usize {
        lock(&self.block_requests).get(&block_number).copied().unwrap_or_default()
    }

    /// Returns the lowest block number ever requested.
    pub fn lowest_block_requested(&self) -> Option<u64> {
        lock(&self.block_requests).keys().min().copied()
    }

    /// Returns the block the archiver is expected to produce for `block_number`.
    pub fn expected_block(&self, block_number: u64, include_traces: bool) -> ArchivedBlock {
        let block = Self::block(block_number);
        let receipts = block
            .transactions
            .iter()
            .map(|tx| (tx.hash, Self::receipt(tx.hash, tx.hash)))
            .collect();
        let traces = include_traces.then(|| {
            block
                .transactions
                .iter()
                .map(|tx| {
                    if self.untraceable.contains(&tx.hash) {
                        TraceResult::empty(tx.hash)
                    } else {
                        TraceResult::new(tx.hash, Self::trace(tx.hash))
                    }
                })
                .collect()
        });
        ArchivedBlock { block, receipts, traces }
    }

    fn block(block_number: u64) -> RpcBlock {
        let transactions = (0..Self::tx_count(block_number))
            .map(|index| {
                let mut other = Map::new();
                other.insert("nonce".to_string(), json!(U64::from(index)));
                other.insert("transactionIndex".to_string(), json!(U64::from(index)));
                other.insert("input".to_string(), json!("0x"));
                RpcTransaction { hash: Self::transaction_hash(block_number, index), other }
            })
            .collect();

        let mut other = Map::new();
        other.insert("timestamp".to_string(), json!(U64::from(1_600_000_000 + block_number)));
        other.insert("gasUsed".to_string(), json!("0x5208"));

        RpcBlock {
            number: U64::from(block_number),
            hash: Self::block_hash(block_number),
            parent_hash: block_number
                .checked_sub(1)
                .map_or(B256::ZERO, Self::block_hash),
            transactions,
            other,
        }
    }

    fn receipt(tx_hash: B256, reported: B256) -> RpcReceipt {
        let (_, index) = Self::locate(tx_hash);
        let mut other = Map::new();
        other.insert("gasUsed".to_string(), json!("0x5208"));
        other.insert("logs".to_string(), json!(vec![json!({ "logIndex": "0x0" }); index % 3]));
        RpcReceipt { transaction_hash: reported, status: Some(U64::from(1)), other }
    }

    fn trace(tx_hash: B256) -> CallTrace {
        let (block_number, index) = Self::locate(tx_hash);
        let mut child = CallTrace::new("STATICCALL", Address::repeat_byte(0x02));
        child.to = Some(Address::repeat_byte(0x03));
        child.gas = U64::from(10_000);
        child.gas_used = U64::from(2_100);
        child.input = Bytes::from(vec![index as u8]);
        child.output = Some(Bytes::new());

        let mut root = CallTrace::new("CALL", Address::repeat_byte(0x01));
        root.to = Some(Address::repeat_byte(0x02));
        root.value = Some(U256::from(block_number));
        root.gas = U64::from(50_000);
        root.gas_used = U64::from(21_000);
        root.calls = vec![child];
        root
    }

    async fn get_block(&self, block_number: u64) -> Result<Value, RpcError> {
        *lock(&self.block_requests).entry(block_number).or_default() += 1;

        if let Some(latency) = self.latency {
            // Spread completions so later blocks often finish first.
            let factor = (block_number.wrapping_mul(7919) % 5 + 1) as u32;
            tokio::time::sleep(latency * factor).await;
        }

        {
            let mut failures = lock(&self.transient_failures);
            if let Some(remaining) = failures.get_mut(&block_number) &&
                *remaining > 0
            {
                *remaining -= 1;
                return Err(RpcError::Transport(TransportError::Status {
                    status: 503,
                    body: "service unavailable".to_string(),
                }));
            }
        }

        if block_number > self.head.load(Ordering::SeqCst) {
            return Ok(Value::Null);
        }

        let mut value = to_value(&Self::block(block_number))?;
        if self.without_transactions.contains(&block_number) &&
            let Some(object) = value.as_object_mut()
        {
            object.remove("transactions");
        }
        Ok(value)
    }

    fn get_receipt(&self, tx_hash: B256) -> Result<Value, RpcError> {
        let (block_number, index) = Self::locate(tx_hash);
        if self.unindexed_receipts.contains(&block_number) {
            return Ok(Value::Null);
        }
        let reported = if index == 0 && self.foreign_receipts.contains(&block_number) {
            Self::transaction_hash(block_number + 1, 0)
        } else {
            tx_hash
        };
        to_value(&Self::receipt(tx_hash, reported))
    }

    fn trace_block(&self, block_number: u64) -> Result<Value, RpcError> {
        let block = Self::block(block_number);
        if self.failing_block_traces.contains(&block_number) ||
            block.transactions.iter().any(|tx| self.untraceable.contains(&tx.hash))
        {
            return Err(error_response(-32000, "execution timeout"));
        }
        let traces: Vec<_> = block
            .transactions
            .iter()
            .map(|tx| TraceResult::new(tx.hash, Self::trace(tx.hash)))
            .collect();
        to_value(&traces)
    }

    fn trace_transaction(&self, tx_hash: B256) -> Result<Value, RpcError> {
        if self.untraceable.contains(&tx_hash) {
            return Err(error_response(-32000, crate::INCORRECT_TOP_LEVEL_CALLS));
        }
        to_value(&Self::trace(tx_hash))
    }
}

#[async_trait]
impl RpcCall for MockChain {
    async fn call_raw(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        *lock(&self.calls).entry(method).or_default() += 1;

        match method {
            "eth_chainId" => Ok(json!(U64::from(self.chain_id))),
            "eth_blockNumber" => Ok(json!(U64::from(self.head.load(Ordering::SeqCst)))),
            "eth_getBlockByNumber" => {
                let number: U64 = param(&params, 0)?;
                self.get_block(number.to()).await
            }
            "eth_getTransactionReceipt" => self.get_receipt(param(&params, 0)?),
            "debug_traceBlockByNumber" => {
                let number: U64 = param(&params, 0)?;
                self.trace_block(number.to())
            }
            "debug_traceTransaction" => self.trace_transaction(param(&params, 0)?),
            _ => Err(error_response(-32601, "method not found")),
        }
    }
}

/// Wraps a [`BlockSource`] and records the highest number of concurrent fetches.
#[derive(Debug)]
pub struct CountingSource<S> {
    inner: S,
    current: AtomicUsize,
    max: AtomicUsize,
}

impl<S> CountingSource<S> {
    /// Wraps `inner`.
    pub const fn new(inner: S) -> Self {
        Self { inner, current: AtomicUsize::new(0), max: AtomicUsize::new(0) }
    }

    /// Returns the highest number of fetches observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S> BlockSource for CountingSource<S>
where
    S: BlockSource,
{
    async fn fetch_block(&self, block_number: u64) -> Result<ArchivedBlock, FetchError> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.current);
        self.max.fetch_max(running, Ordering::SeqCst);
        self.inner.fetch_block(block_number).await
    }

    async fn chain_head(&self) -> Result<u64, FetchError> {
        self.inner.chain_head().await
    }
}
