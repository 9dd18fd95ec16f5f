//! Keeps a window of block fetches running ahead of the commit point.

use crate::{
    ArchiverConfig, ArchiverError, BlockBuffer, BlockSource, FetchError, metrics::Metrics,
};
use archiver_primitives::ArchivedBlock;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;

type FetchResult = (u64, Result<ArchivedBlock, FetchError>);

/// Launches fetches for `[next, next + prefetch_window - 1]`, clipped to the chain head and
/// the end block, and fills the [`BlockBuffer`] as they complete.
///
/// `next` is the committer's next block to write, observed through a watch channel. At
/// most `max_concurrent` fetches run at once. Transient failures are reissued after
/// `retry_delay`; structural failures stop the scheduler with an error.
#[derive(Debug)]
pub struct Scheduler<S> {
    source: Arc<S>,
    buffer: Arc<BlockBuffer>,
    next_to_write: watch::Receiver<u64>,
    head: Arc<AtomicU64>,
    cancel: CancellationToken,
    prefetch_window: u64,
    max_concurrent: usize,
    end_block: Option<u64>,
    head_poll_interval: Duration,
    retry_delay: Duration,
}

/// Bookkeeping of the fetches the scheduler owns.
#[derive(Debug, Default)]
struct Fetches {
    tasks: JoinSet<FetchResult>,
    active: HashSet<u64>,
    attempts: HashMap<u64, u32>,
    retry_at: HashMap<u64, Instant>,
}

impl<S> Scheduler<S>
where
    S: BlockSource + 'static,
{
    /// Creates a new [`Scheduler`].
    pub fn new(
        config: &ArchiverConfig,
        source: Arc<S>,
        buffer: Arc<BlockBuffer>,
        next_to_write: watch::Receiver<u64>,
        head: Arc<AtomicU64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            buffer,
            next_to_write,
            head,
            cancel,
            prefetch_window: config.prefetch_window as u64,
            max_concurrent: config.max_concurrent,
            end_block: config.end_block,
            head_poll_interval: config.head_poll_interval,
            retry_delay: config.retry_delay,
        }
    }

    /// Runs until the end block has been committed, the committer goes away or the token
    /// is cancelled. Fetches still running on exit are aborted.
    pub async fn run(mut self) -> Result<(), ArchiverError> {
        let mut fetches = Fetches::default();
        let mut head: Option<u64> = None;
        let mut next_head_poll = Instant::now();

        info!(target: "scheduler", next = *self.next_to_write.borrow(), "Started scheduler");

        loop {
            let next = *self.next_to_write.borrow_and_update();
            if let Some(end) = self.end_block &&
                next > end
            {
                info!(target: "scheduler", end, "Reached end block");
                break;
            }

            if Instant::now() >= next_head_poll {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    result = self.source.chain_head() => match result {
                        Ok(latest) => {
                            if head != Some(latest) {
                                debug!(target: "scheduler", head = latest, "Chain head updated");
                            }
                            head = Some(latest);
                            self.head.store(latest, Ordering::Relaxed);
                            Metrics::set_chain_head(latest);
                        }
                        Err(err) => {
                            warn!(target: "scheduler", %err, "Failed to poll chain head");
                        }
                    }
                }
                next_head_poll = Instant::now() + self.head_poll_interval;
            }

            if let Some(head) = head {
                self.launch(&mut fetches, next, head);
            }

            let wake = fetches.retry_at.values().copied().fold(next_head_poll, Instant::min);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(target: "scheduler", "Scheduler cancelled");
                    break;
                }
                Some(joined) = fetches.tasks.join_next(), if !fetches.tasks.is_empty() => {
                    let (block_number, result) =
                        joined.map_err(|err| ArchiverError::Task(err.to_string()))?;
                    self.complete(&mut fetches, block_number, result)?;
                }
                changed = self.next_to_write.changed() => {
                    if changed.is_err() {
                        debug!(target: "scheduler", "Committer stopped");
                        break;
                    }
                    fetches.retry_at.retain(|number, _| *number >= *self.next_to_write.borrow());
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }

        fetches.tasks.abort_all();
        Metrics::set_inflight(0);
        Ok(())
    }

    /// Starts every fetch the window, the head and the concurrency ceiling allow.
    fn launch(&self, fetches: &mut Fetches, next: u64, head: u64) {
        let mut last = next.saturating_add(self.prefetch_window.saturating_sub(1)).min(head);
        if let Some(end) = self.end_block {
            last = last.min(end);
        }

        let now = Instant::now();
        // The committer may already hold `next` while it stores it.
        let mut number = next.max(self.buffer.first_unclaimed());
        while number <= last && fetches.active.len() < self.max_concurrent {
            let due = fetches.retry_at.get(&number).is_none_or(|at| *at <= now);
            if due && !fetches.active.contains(&number) && self.buffer.is_missing(number) {
                fetches.retry_at.remove(&number);
                fetches.active.insert(number);

                let source = Arc::clone(&self.source);
                fetches.tasks.spawn(async move { (number, source.fetch_block(number).await) });
                trace!(target: "scheduler", block_number = number, "Launched fetch");
            }
            number += 1;
        }
        Metrics::set_inflight(fetches.active.len());
    }

    /// Buffers a fetched block, or schedules a retry for a transient failure.
    fn complete(
        &self,
        fetches: &mut Fetches,
        block_number: u64,
        result: Result<ArchivedBlock, FetchError>,
    ) -> Result<(), ArchiverError> {
        fetches.active.remove(&block_number);
        Metrics::set_inflight(fetches.active.len());

        match result {
            Ok(block) => {
                if let Some(attempts) = fetches.attempts.remove(&block_number) {
                    info!(target: "scheduler", block_number, attempts, "Fetched after retries");
                }
                if !self.buffer.insert(block) {
                    trace!(target: "scheduler", block_number, "Dropped already committed block");
                }
                Ok(())
            }
            Err(err) if err.is_structural() => {
                Metrics::record_fetch_error(err.kind());
                error!(target: "scheduler", block_number, %err, "Structural fetch error");
                Err(ArchiverError::Fetch { block_number, source: err })
            }
            Err(err) => {
                Metrics::record_fetch_error(err.kind());
                let attempt = fetches.attempts.entry(block_number).or_default();
                *attempt += 1;
                warn!(
                    target: "scheduler",
                    block_number,
                    attempt = *attempt,
                    %err,
                    "Fetch failed, retrying"
                );
                fetches.retry_at.insert(block_number, Instant::now() + self.retry_delay);
                Ok(())
            }
        }
    }
}
