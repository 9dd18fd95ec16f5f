//! Periodic progress logging.

use std::time::Duration;
use tokio::time::Instant;

/// A snapshot of archival throughput.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Last committed block.
    pub block_number: u64,
    /// Blocks between the last committed block and the chain head.
    pub remaining: u64,
    /// Committed blocks per second since the previous report.
    pub blocks_per_sec: f64,
    /// Committed transactions per second since the previous report.
    pub txs_per_sec: f64,
    /// Estimated time to reach the chain head at the current block rate.
    pub eta: Option<Duration>,
}

/// Accumulates commits and reports throughput every `interval`.
#[derive(Debug)]
pub struct ProgressReporter {
    interval: Duration,
    last_report: Instant,
    blocks: u64,
    transactions: u64,
}

impl ProgressReporter {
    /// Creates a new [`ProgressReporter`] whose first report is due after `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_report: Instant::now(), blocks: 0, transactions: 0 }
    }

    /// Records a committed block and logs a report if one is due.
    pub fn record(&mut self, block_number: u64, transactions: usize, head: u64) {
        self.blocks += 1;
        self.transactions += transactions as u64;
        if let Some(progress) = self.poll(block_number, head) {
            info!(
                target: "archiver",
                block_number = progress.block_number,
                remaining = progress.remaining,
                blocks_per_sec = format_args!("{:.2}", progress.blocks_per_sec),
                txs_per_sec = format_args!("{:.2}", progress.txs_per_sec),
                eta_hours = progress.eta.map(|eta| eta.as_secs_f64() / 3600.0),
                "Archival progress"
            );
        }
    }

    /// Returns a report and resets the counters if `interval` has passed since the last one.
    pub fn poll(&mut self, block_number: u64, head: u64) -> Option<Progress> {
        let elapsed = self.last_report.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let blocks_per_sec = self.blocks as f64 / secs;
        let remaining = head.saturating_sub(block_number);
        let eta = (blocks_per_sec > 0.0)
            .then(|| Duration::from_secs_f64(remaining as f64 / blocks_per_sec));

        let progress = Progress {
            block_number,
            remaining,
            blocks_per_sec,
            txs_per_sec: self.transactions as f64 / secs,
            eta,
        };
        self.last_report = Instant::now();
        self.blocks = 0;
        self.transactions = 0;
        Some(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reports_rates_once_per_interval() {
        let mut reporter = ProgressReporter::new(Duration::from_secs(10));
        for number in 1..=20 {
            reporter.record(number, 3, 220);
        }
        assert!(reporter.poll(20, 220).is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        let progress = reporter.poll(20, 220).unwrap();
        assert_eq!(progress.remaining, 200);
        assert!((progress.blocks_per_sec - 2.0).abs() < 1e-9);
        assert!((progress.txs_per_sec - 6.0).abs() < 1e-9);
        assert_eq!(progress.eta, Some(Duration::from_secs(100)));

        // Counters start over after a report.
        assert!(reporter.poll(20, 220).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_eta_without_progress() {
        let mut reporter = ProgressReporter::new(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(reporter.poll(5, 10).unwrap().eta, None);
    }
}
