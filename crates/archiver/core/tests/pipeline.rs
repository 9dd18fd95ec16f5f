//! End-to-end runs of the archiver against a mock chain.

use archiver_core::{
    ArchiveSummary, Archiver, ArchiverConfig, ArchiverError, BlockFetcher, ResumeError,
    test_utils::{CountingSource, MockChain},
};
use archiver_storage::{
    BlockReader, BlockSink, FileWatermark, MemorySink, ShardedFileSink, WatermarkStore,
};
use std::{collections::HashSet, sync::Arc, time::Duration};

fn config(window: usize, max_concurrent: usize, end: Option<u64>) -> ArchiverConfig {
    ArchiverConfig {
        end_block: end,
        prefetch_window: window,
        max_concurrent,
        head_poll_interval: Duration::from_millis(10),
        retry_delay: Duration::from_millis(5),
        write_retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

fn fetcher(chain: &Arc<MockChain>) -> Arc<BlockFetcher<Arc<MockChain>>> {
    Arc::new(BlockFetcher::new(Arc::clone(chain), 64, 8))
}

async fn archive(
    config: ArchiverConfig,
    chain: &Arc<MockChain>,
    sink: &Arc<MemorySink>,
) -> Result<ArchiveSummary, ArchiverError> {
    let archiver = Archiver::new(config, fetcher(chain), Arc::clone(sink), Arc::clone(sink));
    tokio::time::timeout(Duration::from_secs(30), archiver.run()).await.expect("archiver hung")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn archives_a_thousand_blocks_in_order() {
    let chain = Arc::new(MockChain::new(2_000).with_latency(Duration::from_micros(200)));
    let source = Arc::new(CountingSource::new(BlockFetcher::new(Arc::clone(&chain), 64, 8)));
    let sink = Arc::new(MemorySink::new());

    let archiver = Archiver::new(
        config(50, 10, Some(1_000)),
        Arc::clone(&source),
        Arc::clone(&sink),
        Arc::clone(&sink),
    );
    let summary = archiver.run().await.unwrap();

    let expected: Vec<u64> = (1..=1_000).collect();
    assert_eq!(
        summary,
        ArchiveSummary { resumed_from: 1, committed: 1_000, last_committed: Some(1_000) }
    );
    assert_eq!(sink.writes(), expected);
    assert_eq!(sink.watermark_history(), expected);
    assert_eq!(sink.load_watermark().unwrap(), Some(1_000));
    assert!(source.max_concurrent() <= 10);
    assert!((1..=1_000).all(|number| chain.block_requests(number) == 1));
    assert_eq!(chain.block_requests(1_001), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_failure_does_not_reorder_commits() {
    let chain = Arc::new(
        MockChain::new(100)
            .with_latency(Duration::from_micros(200))
            .with_transient_failures(42, 2),
    );
    let sink = Arc::new(MemorySink::new());

    archive(config(20, 10, Some(100)), &chain, &sink).await.unwrap();

    assert_eq!(sink.writes(), (1..=100).collect::<Vec<_>>());
    assert_eq!(chain.block_requests(42), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resumes_after_the_watermark_without_gaps() {
    let sink = Arc::new(MemorySink::new());
    let first = Arc::new(MockChain::new(100));
    archive(config(8, 4, Some(10)), &first, &sink).await.unwrap();

    let second = Arc::new(MockChain::new(100));
    let summary = archive(config(8, 4, Some(20)), &second, &sink).await.unwrap();

    assert_eq!(summary.resumed_from, 11);
    assert_eq!(second.lowest_block_requested(), Some(11));
    assert_eq!(sink.writes(), (1..=20).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rewrites_blocks_stored_past_the_watermark() {
    let chain = Arc::new(MockChain::new(100));
    let sink = Arc::new(MemorySink::new());
    for number in 1..=12 {
        sink.store(number, &chain.expected_block(number, false)).unwrap();
    }
    sink.save_watermark(10).unwrap();

    let summary = archive(config(8, 4, Some(15)), &chain, &sink).await.unwrap();

    assert_eq!(summary.resumed_from, 11);
    // Blocks 11 and 12 are stored twice, the sink still holds one copy of each.
    assert_eq!(sink.writes()[12..], [11, 12, 13, 14, 15]);
    assert_eq!(sink.len(), 15);
    assert_eq!(sink.read_block(11).unwrap(), chain.expected_block(11, false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refuses_a_watermark_ahead_of_the_sink() {
    let chain = Arc::new(MockChain::new(100));
    let sink = Arc::new(MemorySink::new());
    sink.store(1, &chain.expected_block(1, false)).unwrap();
    sink.save_watermark(5).unwrap();

    let err = archive(config(8, 4, Some(10)), &chain, &sink).await.unwrap_err();
    assert!(matches!(
        err,
        ArchiverError::Resume(ResumeError::WatermarkAhead { watermark: 5, last_stored: Some(1) })
    ));
    assert_eq!(chain.calls("eth_getBlockByNumber"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn receipt_parity_violation_stops_before_the_sink() {
    let chain = Arc::new(MockChain::new(100).with_foreign_receipt(7));
    let sink = Arc::new(MemorySink::new());

    let err = archive(config(4, 4, Some(20)), &chain, &sink).await.unwrap_err();

    assert_eq!(err.block_number(), Some(7));
    assert!(err.to_string().contains("block 7"));
    let writes = sink.writes();
    assert!(writes.len() < 7);
    assert_eq!(writes, (1..=writes.len() as u64).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_leaves_a_consistent_watermark() {
    let chain = Arc::new(MockChain::new(1_000_000).with_latency(Duration::from_millis(1)));
    let sink = Arc::new(MemorySink::new());
    let archiver =
        Archiver::new(config(16, 8, None), fetcher(&chain), Arc::clone(&sink), Arc::clone(&sink));
    let cancel = archiver.cancel_token();

    let handle = tokio::spawn(archiver.run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let summary =
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();

    let last = summary.last_committed.unwrap();
    assert_eq!(sink.writes(), (1..=last).collect::<Vec<_>>());
    assert_eq!(sink.load_watermark().unwrap(), Some(last));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn archives_traces_with_fallbacks() {
    let chain = MockChain::new(100).with_failing_block_trace(5);
    let untraceable = chain.tx_hash(9, 0);
    let listed = chain.tx_hash(6, 1);
    let chain = Arc::new(chain.with_untraceable_tx(untraceable).with_untraceable_tx(listed));
    let sink = Arc::new(MemorySink::new());

    let config = ArchiverConfig {
        include_traces: true,
        known_bad_traces: HashSet::from([listed]),
        verify_parent_hash: true,
        ..config(8, 4, Some(12))
    };
    let source = Arc::new(BlockFetcher::from_config(Arc::clone(&chain), &config));
    Archiver::new(config, source, Arc::clone(&sink), Arc::clone(&sink)).run().await.unwrap();

    for number in 1..=12 {
        assert_eq!(sink.read_block(number).unwrap(), chain.expected_block(number, true));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resumes_from_shard_files_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Arc::new(MockChain::new(100));

    for end in [30, 60] {
        let sink = Arc::new(ShardedFileSink::open(dir.path().join("blocks"), 16 * 1024).unwrap());
        let watermark = Arc::new(FileWatermark::new(dir.path().join("watermark")));
        Archiver::new(config(8, 4, Some(end)), fetcher(&chain), sink, watermark)
            .run()
            .await
            .unwrap();
    }

    let sink = ShardedFileSink::open(dir.path().join("blocks"), 16 * 1024).unwrap();
    assert_eq!(sink.last_stored_block_number().unwrap(), 60);
    let watermark = FileWatermark::new(dir.path().join("watermark"));
    assert_eq!(watermark.load_watermark().unwrap(), Some(60));
    for number in 1..=60 {
        assert_eq!(chain.block_requests(number), 1);
        assert_eq!(sink.read_block(number).unwrap(), chain.expected_block(number, false));
    }
}
