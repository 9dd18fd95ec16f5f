//! Wires the scheduler and the committer together.

use crate::{
    ArchiverConfig, ArchiverError, BlockBuffer, BlockSource, CommitSummary, Committer,
    ResumeTracker, Scheduler,
};
use archiver_storage::{BlockReader, BlockSink, WatermarkStore};
use std::sync::{Arc, atomic::AtomicU64};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// The outcome of an [`Archiver::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// First block this run set out to write.
    pub resumed_from: u64,
    /// Number of blocks committed.
    pub committed: u64,
    /// Last committed block, `None` if nothing was committed.
    pub last_committed: Option<u64>,
}

/// An ordered, resumable block archiver.
///
/// Resumes from the sink and the watermark, then runs a [`Scheduler`] filling a
/// [`BlockBuffer`] and a [`Committer`] draining it until the end block is committed, a
/// fatal error occurs or the cancellation token fires.
#[derive(Debug)]
pub struct Archiver<S, K, W> {
    config: ArchiverConfig,
    source: Arc<S>,
    sink: Arc<K>,
    watermark: Arc<W>,
    cancel: CancellationToken,
}

impl<S, K, W> Archiver<S, K, W>
where
    S: BlockSource + 'static,
    K: BlockSink + BlockReader + 'static,
    W: WatermarkStore + 'static,
{
    /// Creates a new [`Archiver`].
    pub fn new(config: ArchiverConfig, source: Arc<S>, sink: Arc<K>, watermark: Arc<W>) -> Self {
        Self { config, source, sink, watermark, cancel: CancellationToken::new() }
    }

    /// Replaces the cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns a token that stops the archiver when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Computes the first block to write.
    pub async fn resume_point(&self) -> Result<u64, ArchiverError> {
        let sink = Arc::clone(&self.sink);
        let watermark = Arc::clone(&self.watermark);
        let start_block = self.config.start_block;

        tokio::task::spawn_blocking(move || {
            ResumeTracker::new(&*sink, &*watermark).resume_point(start_block)
        })
        .await
        .map_err(|err| ArchiverError::Task(err.to_string()))?
        .map_err(Into::into)
    }

    /// Runs the archiver.
    ///
    /// Buffered blocks that were not committed are dropped on return; a later run fetches
    /// them again from the watermark.
    pub async fn run(self) -> Result<ArchiveSummary, ArchiverError> {
        self.config.validate()?;
        let next = self.resume_point().await?;

        if let Some(end) = self.config.end_block &&
            next > end
        {
            info!(target: "archiver", next, end, "Nothing to archive");
            return Ok(ArchiveSummary { resumed_from: next, committed: 0, last_committed: None });
        }

        info!(
            target: "archiver",
            next,
            end_block = ?self.config.end_block,
            prefetch_window = self.config.prefetch_window,
            max_concurrent = self.config.max_concurrent,
            "Starting archiver"
        );

        let buffer = Arc::new(BlockBuffer::new());
        let head = Arc::new(AtomicU64::new(0));
        let (next_tx, next_rx) = watch::channel(next);

        let scheduler = Scheduler::new(
            &self.config,
            self.source,
            Arc::clone(&buffer),
            next_rx,
            Arc::clone(&head),
            self.cancel.clone(),
        );
        let committer = Committer::new(
            &self.config,
            self.sink,
            self.watermark,
            Arc::clone(&buffer),
            next_tx,
            head,
            self.cancel.clone(),
        );

        let result = tokio::try_join!(scheduler.run(), committer.run());
        let dropped = buffer.len();
        buffer.clear();

        let ((), CommitSummary { committed, last_committed }) = result.inspect_err(|err| {
            error!(target: "archiver", %err, "Archiver stopped on a fatal error");
        })?;

        info!(target: "archiver", committed, ?last_committed, dropped, "Archiver stopped");
        Ok(ArchiveSummary { resumed_from: next, committed, last_committed })
    }
}
