//! Metrics for the RPC layer.

/// Container for the batching client's metrics.
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Identifier for the counter of batches sent.
    pub const RPC_BATCHES_SENT_TOTAL: &'static str = "archiver_rpc_batches_sent_total";
    /// Identifier for the histogram of calls per batch.
    pub const RPC_BATCH_CALLS: &'static str = "archiver_rpc_batch_calls";
    /// Identifier for the counter of batches with at least one failed call.
    pub const RPC_BATCH_ERRORS_TOTAL: &'static str = "archiver_rpc_batch_errors_total";
    /// Identifier for the gauge of the current batch size.
    pub const RPC_BATCH_SIZE: &'static str = "archiver_rpc_batch_size";
    /// Identifier for the counter of unbatched requests.
    pub const RPC_DIRECT_REQUESTS_TOTAL: &'static str = "archiver_rpc_direct_requests_total";

    /// Describes and zeroes every RPC metric.
    pub fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::RPC_BATCHES_SENT_TOTAL,
            metrics::Unit::Count,
            "Number of JSON-RPC batch requests sent",
        );
        metrics::describe_histogram!(
            Self::RPC_BATCH_CALLS,
            metrics::Unit::Count,
            "Number of calls carried by each batch request",
        );
        metrics::describe_counter!(
            Self::RPC_BATCH_ERRORS_TOTAL,
            metrics::Unit::Count,
            "Number of batch requests that failed fully or for some of their calls",
        );
        metrics::describe_gauge!(
            Self::RPC_BATCH_SIZE,
            metrics::Unit::Count,
            "Maximum number of calls that go into the next batch",
        );
        metrics::describe_counter!(
            Self::RPC_DIRECT_REQUESTS_TOTAL,
            metrics::Unit::Count,
            "Number of unbatched JSON-RPC requests sent",
        );
    }

    fn zero() {
        metrics::counter!(Self::RPC_BATCHES_SENT_TOTAL).increment(0);
        metrics::counter!(Self::RPC_BATCH_ERRORS_TOTAL).increment(0);
        metrics::counter!(Self::RPC_DIRECT_REQUESTS_TOTAL).increment(0);
        metrics::gauge!(Self::RPC_BATCH_SIZE).set(0.0);
    }

    pub(crate) fn record_batch_sent(size: usize) {
        metrics::counter!(Self::RPC_BATCHES_SENT_TOTAL).increment(1);
        metrics::histogram!(Self::RPC_BATCH_CALLS).record(size as f64);
    }

    pub(crate) fn record_batch_error() {
        metrics::counter!(Self::RPC_BATCH_ERRORS_TOTAL).increment(1);
    }

    pub(crate) fn set_batch_size(size: usize) {
        metrics::gauge!(Self::RPC_BATCH_SIZE).set(size as f64);
    }

    pub(crate) fn record_direct_request() {
        metrics::counter!(Self::RPC_DIRECT_REQUESTS_TOTAL).increment(1);
    }
}
