//! Fetches one block with its receipts and traces.

use crate::{ArchiverConfig, BlockSource, FetchError, metrics::Metrics};
use alloy_primitives::B256;
use archiver_primitives::{ArchivedBlock, RpcBlock, RpcReceipt, TraceResult};
use archiver_rpc::{EthApi, RpcCall, RpcError};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use tokio::sync::Semaphore;

/// Error message of nodes that cannot trace calls into some precompiles.
pub const INCORRECT_TOP_LEVEL_CALLS: &str = "incorrect number of top-level calls";

/// Fetches blocks, receipts and call traces through an [`RpcCall`] client.
///
/// Block and receipt calls share one concurrency ceiling, trace calls have a separate,
/// usually smaller one. Both are shared by every block being fetched.
#[derive(Debug)]
pub struct BlockFetcher<R> {
    rpc: R,
    rpc_limit: Arc<Semaphore>,
    debug_limit: Arc<Semaphore>,
    include_traces: bool,
    known_bad_traces: HashSet<B256>,
}

impl<R> BlockFetcher<R>
where
    R: RpcCall,
{
    /// Creates a new [`BlockFetcher`].
    pub fn new(rpc: R, rpc_concurrency: usize, debug_concurrency: usize) -> Self {
        Self {
            rpc,
            rpc_limit: Arc::new(Semaphore::new(rpc_concurrency)),
            debug_limit: Arc::new(Semaphore::new(debug_concurrency)),
            include_traces: false,
            known_bad_traces: HashSet::new(),
        }
    }

    /// Creates a new [`BlockFetcher`] with the limits and trace settings of `config`.
    pub fn from_config(rpc: R, config: &ArchiverConfig) -> Self {
        Self::new(rpc, config.rpc_concurrency, config.debug_concurrency)
            .with_traces(config.include_traces)
            .with_known_bad_traces(config.known_bad_traces.clone())
    }

    /// Enables call trace collection.
    pub const fn with_traces(mut self, include_traces: bool) -> Self {
        self.include_traces = include_traces;
        self
    }

    /// Sets the transactions archived without a trace.
    pub fn with_known_bad_traces(mut self, known_bad_traces: HashSet<B256>) -> Self {
        self.known_bad_traces = known_bad_traces;
        self
    }

    /// Returns the underlying client.
    pub const fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Fetches the block at `block_number` with its receipts and, if enabled, traces.
    pub async fn fetch(&self, block_number: u64) -> Result<ArchivedBlock, FetchError> {
        let block = {
            let _permit =
                self.rpc_limit.acquire().await.map_err(|_| FetchError::LimiterClosed)?;
            self.rpc.block_by_number(block_number).await
        }
        .map_err(|err| match err {
            RpcError::Decode { reason, .. } => FetchError::MalformedBlock { block_number, reason },
            source => FetchError::Rpc { block_number, source },
        })?
        .ok_or(FetchError::NullBlock(block_number))?;

        if block.number() != block_number {
            return Err(FetchError::NumberMismatch {
                requested: block_number,
                returned: block.number(),
            });
        }

        let receipts = try_join_all(
            block.transactions.iter().map(|tx| self.receipt(block_number, tx.hash)),
        );
        let traces = async {
            if self.include_traces { self.traces(&block).await.map(Some) } else { Ok(None) }
        };
        let (receipts, traces) = tokio::try_join!(receipts, traces)?;

        let receipts: BTreeMap<_, _> =
            block.transactions.iter().map(|tx| tx.hash).zip(receipts).collect();
        let archived = ArchivedBlock::new(block, receipts, traces)?;
        Metrics::record_block_fetched(archived.transactions().len());
        Ok(archived)
    }

    async fn receipt(&self, block_number: u64, tx_hash: B256) -> Result<RpcReceipt, FetchError> {
        let _permit = self.rpc_limit.acquire().await.map_err(|_| FetchError::LimiterClosed)?;
        match self.rpc.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => Ok(receipt),
            Ok(None) => Err(FetchError::ReceiptUnavailable { block_number, tx_hash }),
            Err(RpcError::Decode { reason, .. }) => {
                Err(FetchError::MalformedReceipt { block_number, tx_hash, reason })
            }
            Err(source) => Err(FetchError::Rpc { block_number, source }),
        }
    }

    /// Traces the whole block in one call, falling back to one call per transaction.
    async fn traces(&self, block: &RpcBlock) -> Result<Vec<TraceResult>, FetchError> {
        let block_number = block.number();
        if block.transactions.is_empty() {
            return Ok(Vec::new());
        }

        let whole = {
            let _permit =
                self.debug_limit.acquire().await.map_err(|_| FetchError::LimiterClosed)?;
            self.rpc.trace_block_by_number(block_number).await
        };

        match whole {
            Ok(mut traces) if traces.len() == block.transactions.len() => {
                for (trace, tx) in traces.iter_mut().zip(&block.transactions) {
                    trace.tx_hash.get_or_insert(tx.hash);
                }
                return Ok(traces);
            }
            Ok(traces) => {
                info!(
                    target: "fetcher",
                    block_number,
                    traces = traces.len(),
                    transactions = block.transactions.len(),
                    "Block trace has the wrong length, falling back to per-tx tracing"
                );
            }
            Err(err) => {
                info!(
                    target: "fetcher",
                    block_number,
                    %err,
                    "Block trace failed, falling back to per-tx tracing"
                );
            }
        }
        Metrics::record_trace_fallback();

        let per_tx =
            block.transactions.iter().map(|tx| self.trace_transaction(block_number, tx.hash));
        try_join_all(per_tx).await
    }

    async fn trace_transaction(
        &self,
        block_number: u64,
        tx_hash: B256,
    ) -> Result<TraceResult, FetchError> {
        if self.known_bad_traces.contains(&tx_hash) {
            debug!(target: "fetcher", block_number, %tx_hash, "Skipping known bad trace");
            return Ok(TraceResult::empty(tx_hash));
        }

        let result = {
            let _permit =
                self.debug_limit.acquire().await.map_err(|_| FetchError::LimiterClosed)?;
            self.rpc.trace_transaction(tx_hash).await
        };

        match result {
            Ok(trace) => Ok(TraceResult::new(tx_hash, trace)),
            Err(err) if is_untraceable(&err) => {
                info!(
                    target: "fetcher",
                    block_number,
                    %tx_hash,
                    "Node cannot trace transaction, archiving it without a trace"
                );
                Ok(TraceResult::empty(tx_hash))
            }
            Err(RpcError::Decode { reason, .. }) => {
                Err(FetchError::MalformedTrace { block_number, tx_hash, reason })
            }
            Err(source) => Err(FetchError::Trace { block_number, tx_hash, source }),
        }
    }
}

fn is_untraceable(err: &RpcError) -> bool {
    err.error_message().is_some_and(|message| message.contains(INCORRECT_TOP_LEVEL_CALLS))
}

#[async_trait]
impl<R> BlockSource for BlockFetcher<R>
where
    R: RpcCall,
{
    async fn fetch_block(&self, block_number: u64) -> Result<ArchivedBlock, FetchError> {
        self.fetch(block_number).await
    }

    async fn chain_head(&self) -> Result<u64, FetchError> {
        self.rpc.block_number().await.map_err(FetchError::Head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChain;
    use archiver_primitives::BlockValidationError;

    fn fetcher(chain: Arc<MockChain>) -> BlockFetcher<Arc<MockChain>> {
        BlockFetcher::new(chain, 8, 2)
    }

    #[tokio::test]
    async fn test_fetch_block_with_receipts() {
        let chain = Arc::new(MockChain::new(10));
        let block = fetcher(Arc::clone(&chain)).fetch(7).await.unwrap();

        assert_eq!(block.number(), 7);
        assert_eq!(block.transactions().len(), MockChain::tx_count(7));
        assert_eq!(block.receipts.len(), block.transactions().len());
        assert!(block.traces.is_none());
        assert_eq!(block, chain.expected_block(7, false));
    }

    #[tokio::test]
    async fn test_block_trace_preferred() {
        let chain = Arc::new(MockChain::new(10));
        let block = fetcher(Arc::clone(&chain)).with_traces(true).fetch(3).await.unwrap();

        assert_eq!(block.traces.as_ref().map(Vec::len), Some(MockChain::tx_count(3)));
        assert_eq!(chain.calls("debug_traceBlockByNumber"), 1);
        assert_eq!(chain.calls("debug_traceTransaction"), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_per_tx_traces() {
        let chain = Arc::new(MockChain::new(10).with_failing_block_trace(3));
        let block = fetcher(Arc::clone(&chain)).with_traces(true).fetch(3).await.unwrap();

        let traces = block.traces.unwrap();
        assert_eq!(traces.len(), MockChain::tx_count(3));
        assert!(traces.iter().all(|trace| trace.result.is_some()));
        assert_eq!(chain.calls("debug_traceTransaction"), MockChain::tx_count(3));
    }

    #[tokio::test]
    async fn test_untraceable_transactions_get_empty_traces() {
        let chain = MockChain::new(10).with_failing_block_trace(3);
        let bad = chain.tx_hash(3, 0);
        let listed = chain.tx_hash(3, 1);
        let chain = Arc::new(chain.with_untraceable_tx(bad));

        let block = fetcher(Arc::clone(&chain))
            .with_traces(true)
            .with_known_bad_traces(HashSet::from([listed]))
            .fetch(3)
            .await
            .unwrap();

        let traces = block.traces.unwrap();
        assert_eq!(traces[0], TraceResult::empty(bad));
        assert_eq!(traces[1], TraceResult::empty(listed));
        assert!(traces[2].result.is_some());
        // The listed transaction is never sent to the node.
        assert_eq!(chain.calls("debug_traceTransaction"), MockChain::tx_count(3) - 1);
    }

    #[tokio::test]
    async fn test_null_block_is_structural() {
        let chain = Arc::new(MockChain::new(10));
        let err = fetcher(chain).fetch(11).await.unwrap_err();
        assert!(matches!(err, FetchError::NullBlock(11)));
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn test_missing_transactions_is_structural() {
        let chain = Arc::new(MockChain::new(10).without_transactions_field(4));
        let err = fetcher(chain).fetch(4).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedBlock { block_number: 4, .. }));
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn test_receipt_parity_violation_is_structural() {
        let chain = Arc::new(MockChain::new(10).with_foreign_receipt(5));
        let err = fetcher(chain).fetch(5).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Invalid(BlockValidationError::ReceiptHashMismatch { block_number: 5, .. })
        ));
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let chain = Arc::new(MockChain::new(50).with_transient_failures(42, 2));
        let fetcher = fetcher(chain);

        for _ in 0..2 {
            let err = fetcher.fetch(42).await.unwrap_err();
            assert!(matches!(err, FetchError::Rpc { block_number: 42, .. }));
            assert!(!err.is_structural());
        }
        assert_eq!(fetcher.fetch(42).await.unwrap().number(), 42);
    }

    #[tokio::test]
    async fn test_null_receipt_is_transient() {
        let chain = Arc::new(MockChain::new(10).with_unindexed_receipts(6));
        let err = fetcher(chain).fetch(6).await.unwrap_err();
        assert!(matches!(err, FetchError::ReceiptUnavailable { block_number: 6, .. }));
        assert!(!err.is_structural());
    }

    #[tokio::test]
    async fn test_chain_head() {
        let chain = Arc::new(MockChain::new(77));
        assert_eq!(fetcher(chain).chain_head().await.unwrap(), 77);
    }
}
