//! Metrics for the archival pipeline.

/// Container for the pipeline's metrics.
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Identifier for the counter of fetched blocks.
    pub const BLOCKS_FETCHED_TOTAL: &'static str = "archiver_blocks_fetched_total";
    /// Identifier for the counter of fetched transactions.
    pub const TRANSACTIONS_FETCHED_TOTAL: &'static str = "archiver_transactions_fetched_total";
    /// Identifier for the counter of failed fetches, labelled by `kind`.
    pub const FETCH_ERRORS_TOTAL: &'static str = "archiver_fetch_errors_total";
    /// Identifier for the counter of whole-block traces replaced by per-tx traces.
    pub const TRACE_FALLBACKS_TOTAL: &'static str = "archiver_trace_fallbacks_total";
    /// Identifier for the counter of committed blocks.
    pub const BLOCKS_COMMITTED_TOTAL: &'static str = "archiver_blocks_committed_total";
    /// Identifier for the counter of sink and watermark write retries.
    pub const WRITE_RETRIES_TOTAL: &'static str = "archiver_write_retries_total";
    /// Identifier for the gauge of the persisted watermark.
    pub const WATERMARK: &'static str = "archiver_watermark";
    /// Identifier for the gauge of fetched blocks waiting for commit.
    pub const BUFFERED_BLOCKS: &'static str = "archiver_buffered_blocks";
    /// Identifier for the gauge of running block fetches.
    pub const INFLIGHT_FETCHES: &'static str = "archiver_inflight_fetches";
    /// Identifier for the gauge of the last observed chain head.
    pub const CHAIN_HEAD: &'static str = "archiver_chain_head";

    /// Describes and zeroes every pipeline metric.
    pub fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::BLOCKS_FETCHED_TOTAL,
            metrics::Unit::Count,
            "Number of blocks fetched with their receipts",
        );
        metrics::describe_counter!(
            Self::TRANSACTIONS_FETCHED_TOTAL,
            metrics::Unit::Count,
            "Number of transactions in fetched blocks",
        );
        metrics::describe_counter!(
            Self::FETCH_ERRORS_TOTAL,
            metrics::Unit::Count,
            "Number of failed block fetches",
        );
        metrics::describe_counter!(
            Self::TRACE_FALLBACKS_TOTAL,
            metrics::Unit::Count,
            "Number of blocks traced per transaction after the block trace failed",
        );
        metrics::describe_counter!(
            Self::BLOCKS_COMMITTED_TOTAL,
            metrics::Unit::Count,
            "Number of blocks written to the sink in order",
        );
        metrics::describe_counter!(
            Self::WRITE_RETRIES_TOTAL,
            metrics::Unit::Count,
            "Number of retried sink or watermark writes",
        );
        metrics::describe_gauge!(Self::WATERMARK, "Last block number confirmed durable");
        metrics::describe_gauge!(
            Self::BUFFERED_BLOCKS,
            metrics::Unit::Count,
            "Fetched blocks waiting for their turn to be committed",
        );
        metrics::describe_gauge!(
            Self::INFLIGHT_FETCHES,
            metrics::Unit::Count,
            "Block fetches currently running",
        );
        metrics::describe_gauge!(Self::CHAIN_HEAD, "Last observed chain head");
    }

    fn zero() {
        metrics::counter!(Self::BLOCKS_FETCHED_TOTAL).increment(0);
        metrics::counter!(Self::TRANSACTIONS_FETCHED_TOTAL).increment(0);
        metrics::counter!(Self::TRACE_FALLBACKS_TOTAL).increment(0);
        metrics::counter!(Self::BLOCKS_COMMITTED_TOTAL).increment(0);
        metrics::counter!(Self::WRITE_RETRIES_TOTAL).increment(0);
        metrics::gauge!(Self::BUFFERED_BLOCKS).set(0.0);
        metrics::gauge!(Self::INFLIGHT_FETCHES).set(0.0);
    }

    pub(crate) fn record_block_fetched(transactions: usize) {
        metrics::counter!(Self::BLOCKS_FETCHED_TOTAL).increment(1);
        metrics::counter!(Self::TRANSACTIONS_FETCHED_TOTAL).increment(transactions as u64);
    }

    pub(crate) fn record_fetch_error(kind: &'static str) {
        metrics::counter!(Self::FETCH_ERRORS_TOTAL, "kind" => kind).increment(1);
    }

    pub(crate) fn record_trace_fallback() {
        metrics::counter!(Self::TRACE_FALLBACKS_TOTAL).increment(1);
    }

    pub(crate) fn record_commit(block_number: u64) {
        metrics::counter!(Self::BLOCKS_COMMITTED_TOTAL).increment(1);
        metrics::gauge!(Self::WATERMARK).set(block_number as f64);
    }

    pub(crate) fn record_write_retry() {
        metrics::counter!(Self::WRITE_RETRIES_TOTAL).increment(1);
    }

    pub(crate) fn set_buffered(count: usize) {
        metrics::gauge!(Self::BUFFERED_BLOCKS).set(count as f64);
    }

    pub(crate) fn set_inflight(count: usize) {
        metrics::gauge!(Self::INFLIGHT_FETCHES).set(count as f64);
    }

    pub(crate) fn set_chain_head(head: u64) {
        metrics::gauge!(Self::CHAIN_HEAD).set(head as f64);
    }
}
