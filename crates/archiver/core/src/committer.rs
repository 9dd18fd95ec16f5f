//! Writes buffered blocks to the sink in block-number order.

use crate::{ArchiverConfig, ArchiverError, BlockBuffer, ProgressReporter, metrics::Metrics};
use alloy_primitives::B256;
use archiver_primitives::ArchivedBlock;
use archiver_storage::{BlockReader, BlockSink, StorageError, WatermarkStore};
use backon::{ExponentialBuilder, Retryable};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What a committer run achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Number of blocks committed.
    pub committed: u64,
    /// Last committed block, `None` if nothing was committed.
    pub last_committed: Option<u64>,
}

/// Runs a blocking storage call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| StorageError::Io(io::Error::other(err)))?
}

/// The only writer of the sink and the watermark.
///
/// Takes block `next` from the [`BlockBuffer`] once it is there, stores it, saves `next` as
/// the watermark and only then moves on to `next + 1`. The new commit point is published
/// to the scheduler through a watch channel.
#[derive(Debug)]
pub struct Committer<K, W> {
    sink: Arc<K>,
    watermark: Arc<W>,
    buffer: Arc<BlockBuffer>,
    next: u64,
    next_to_write: watch::Sender<u64>,
    head: Arc<AtomicU64>,
    cancel: CancellationToken,
    end_block: Option<u64>,
    verify_parent_hash: bool,
    write_retries: usize,
    write_retry_delay: Duration,
    progress: ProgressReporter,
}

impl<K, W> Committer<K, W>
where
    K: BlockSink + BlockReader + 'static,
    W: WatermarkStore + 'static,
{
    /// Creates a new [`Committer`] whose first block to write is the value in
    /// `next_to_write`.
    pub fn new(
        config: &ArchiverConfig,
        sink: Arc<K>,
        watermark: Arc<W>,
        buffer: Arc<BlockBuffer>,
        next_to_write: watch::Sender<u64>,
        head: Arc<AtomicU64>,
        cancel: CancellationToken,
    ) -> Self {
        let next = *next_to_write.borrow();
        Self {
            sink,
            watermark,
            buffer,
            next,
            next_to_write,
            head,
            cancel,
            end_block: config.end_block,
            verify_parent_hash: config.verify_parent_hash,
            write_retries: config.write_retries,
            write_retry_delay: config.write_retry_delay,
            progress: ProgressReporter::new(config.progress_interval),
        }
    }

    /// Commits blocks until the end block is written or the token is cancelled.
    pub async fn run(mut self) -> Result<CommitSummary, ArchiverError> {
        let mut summary = CommitSummary::default();
        let mut parent = self.previous_hash().await?;

        info!(target: "committer", next = self.next, "Started committer");

        loop {
            if let Some(end) = self.end_block &&
                self.next > end
            {
                info!(target: "committer", end, "Committed end block");
                break;
            }

            let block = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(target: "committer", next = self.next, "Committer cancelled");
                    break;
                }
                block = self.buffer.wait_for(self.next) => block,
            };

            let block_number = self.next;
            block.validate().map_err(|source| ArchiverError::Invalid { block_number, source })?;
            if self.verify_parent_hash &&
                let Some(expected) = parent &&
                block.parent_hash() != expected
            {
                error!(
                    target: "committer",
                    block_number,
                    %expected,
                    actual = %block.parent_hash(),
                    "Block does not link to the previous block"
                );
                return Err(ArchiverError::ParentHashMismatch {
                    block_number,
                    expected,
                    actual: block.parent_hash(),
                });
            }

            let hash = block.hash();
            let transactions = block.transactions().len();
            self.store(block).await?;
            self.save_watermark(block_number).await?;

            parent = Some(hash);
            summary.committed += 1;
            summary.last_committed = Some(block_number);
            Metrics::record_commit(block_number);
            trace!(target: "committer", block_number, transactions, "Committed block");
            self.progress.record(block_number, transactions, self.head.load(Ordering::Relaxed));

            self.next += 1;
            self.next_to_write.send_replace(self.next);
        }

        Ok(summary)
    }

    /// Hash of the block before the first one to write, if parent hashes are checked and
    /// the sink holds it.
    async fn previous_hash(&self) -> Result<Option<B256>, ArchiverError> {
        let Some(previous) = self.next.checked_sub(1).filter(|_| self.verify_parent_hash) else {
            return Ok(None);
        };

        let sink = Arc::clone(&self.sink);
        match blocking(move || sink.read_block(previous)).await {
            Ok(block) => Ok(Some(block.hash())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(source) => Err(ArchiverError::Store { block_number: previous, source }),
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.write_retry_delay)
            .with_max_times(self.write_retries)
    }

    async fn store(&self, block: ArchivedBlock) -> Result<(), ArchiverError> {
        let block_number = block.number();
        let block = Arc::new(block);

        let write = || {
            let sink = Arc::clone(&self.sink);
            let block = Arc::clone(&block);
            async move { blocking(move || sink.store(block_number, &block)).await }
        };

        write
            .retry(self.backoff())
            .notify(|err: &StorageError, after: Duration| {
                Metrics::record_write_retry();
                warn!(
                    target: "committer",
                    block_number,
                    %err,
                    ?after,
                    "Block write failed, retrying"
                );
            })
            .await
            .map_err(|source| {
                error!(target: "committer", block_number, %source, "Giving up on block write");
                ArchiverError::Store { block_number, source }
            })
    }

    async fn save_watermark(&self, block_number: u64) -> Result<(), ArchiverError> {
        let save = || {
            let watermark = Arc::clone(&self.watermark);
            async move { blocking(move || watermark.save_watermark(block_number)).await }
        };

        save.retry(self.backoff())
            .notify(|err: &StorageError, after: Duration| {
                Metrics::record_write_retry();
                warn!(
                    target: "committer",
                    block_number,
                    %err,
                    ?after,
                    "Watermark save failed, retrying"
                );
            })
            .await
            .map_err(|source| ArchiverError::Watermark { block_number, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChain;
    use archiver_storage::MemorySink;

    fn config(end: u64) -> ArchiverConfig {
        ArchiverConfig {
            end_block: Some(end),
            write_retries: 3,
            write_retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn committer(
        config: &ArchiverConfig,
        sink: Arc<MemorySink>,
        next: u64,
    ) -> (Committer<MemorySink, MemorySink>, Arc<BlockBuffer>, watch::Receiver<u64>) {
        let buffer = Arc::new(BlockBuffer::new());
        let (tx, rx) = watch::channel(next);
        let committer = Committer::new(
            config,
            Arc::clone(&sink),
            sink,
            Arc::clone(&buffer),
            tx,
            Arc::new(AtomicU64::new(0)),
            CancellationToken::new(),
        );
        (committer, buffer, rx)
    }

    #[tokio::test]
    async fn test_commits_in_order_regardless_of_arrival() {
        let chain = MockChain::new(100);
        let sink = Arc::new(MemorySink::new());
        let (committer, buffer, rx) = committer(&config(5), Arc::clone(&sink), 1);

        for number in [5, 3, 4, 1, 2] {
            buffer.insert(chain.expected_block(number, false));
        }
        let summary = committer.run().await.unwrap();

        assert_eq!(summary, CommitSummary { committed: 5, last_committed: Some(5) });
        assert_eq!(sink.writes(), vec![1, 2, 3, 4, 5]);
        assert_eq!(sink.watermark_history(), vec![1, 2, 3, 4, 5]);
        assert_eq!(*rx.borrow(), 6);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_write_failures_are_retried_before_the_watermark_moves() {
        let chain = MockChain::new(100);
        let sink = Arc::new(MemorySink::new());
        sink.fail_next_writes(2);
        let (committer, buffer, _rx) = committer(&config(2), Arc::clone(&sink), 1);

        buffer.insert(chain.expected_block(1, false));
        buffer.insert(chain.expected_block(2, false));
        committer.run().await.unwrap();

        assert_eq!(sink.writes(), vec![1, 2]);
        assert_eq!(sink.watermark_history(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_exhausted_write_retries_are_fatal() {
        let chain = MockChain::new(100);
        let sink = Arc::new(MemorySink::new());
        sink.fail_next_writes(10);
        let (committer, buffer, rx) = committer(&config(2), Arc::clone(&sink), 1);

        buffer.insert(chain.expected_block(1, false));
        let err = committer.run().await.unwrap_err();

        assert!(matches!(err, ArchiverError::Store { block_number: 1, .. }));
        assert!(sink.watermark_history().is_empty());
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn test_parent_hash_mismatch_is_fatal() {
        let chain = MockChain::new(100);
        let sink = Arc::new(MemorySink::new());
        sink.store(1, &chain.expected_block(1, false)).unwrap();
        let config = ArchiverConfig { verify_parent_hash: true, ..config(3) };
        let (committer, buffer, _rx) = committer(&config, Arc::clone(&sink), 2);

        buffer.insert(chain.expected_block(2, false));
        let mut forked = chain.expected_block(3, false);
        forked.block.parent_hash = B256::repeat_byte(0xff);
        buffer.insert(forked);

        let err = committer.run().await.unwrap_err();
        assert!(matches!(
            err,
            ArchiverError::ParentHashMismatch { block_number: 3, expected, .. }
                if expected == MockChain::block_hash(2)
        ));
        assert_eq!(sink.writes(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_invalid_block_never_reaches_the_sink() {
        let chain = MockChain::new(100);
        let sink = Arc::new(MemorySink::new());
        let (committer, buffer, _rx) = committer(&config(1), Arc::clone(&sink), 1);

        let mut block = chain.expected_block(1, false);
        block.receipts.pop_first();
        buffer.insert(block);

        let err = committer.run().await.unwrap_err();
        assert!(matches!(err, ArchiverError::Invalid { block_number: 1, .. }));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_waiting() {
        let sink = Arc::new(MemorySink::new());
        let (committer, _buffer, _rx) = committer(&ArchiverConfig::default(), sink, 1);
        let cancel = committer.cancel.clone();

        let handle = tokio::spawn(committer.run());
        cancel.cancel();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, CommitSummary::default());
    }
}
