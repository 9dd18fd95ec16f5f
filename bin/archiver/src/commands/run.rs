//! Run Subcommand

use crate::flags::{GlobalArgs, PipelineArgs, RpcArgs, SinkKind};
use anyhow::{Context as _, Result};
use archiver_core::{ArchiveSummary, Archiver, ArchiverConfig, BlockFetcher, BlockSource};
use archiver_rpc::EthApi;
use archiver_storage::{
    BlockReader, BlockSink, FileWatermark, MdbxSink, MemorySink, ShardedFileSink, WatermarkStore,
};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The `run` Subcommand
///
/// Archives blocks, receipts and optionally traces from a node into
/// `DATA_DIR/<chain id>/`, resuming after the last confirmed block.
///
/// # Usage
///
/// ```sh
/// archiver run --rpc-url <URL> [OPTIONS]
/// ```
#[derive(Parser, Debug, Clone)]
#[command(about = "Archives blocks from a node into the local sink")]
pub struct RunCommand {
    /// RPC client flags.
    #[command(flatten)]
    pub rpc: RpcArgs,
    /// Pipeline flags.
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl RunCommand {
    /// Runs the archiver until the end block is committed or a shutdown signal arrives.
    pub async fn run(self, args: &GlobalArgs) -> Result<()> {
        archiver_rpc::Metrics::init();
        archiver_core::Metrics::init();

        let config = self.pipeline.config();
        config.validate().context("invalid pipeline configuration")?;

        let rpc = self.rpc.client()?;
        let chain_id = rpc.chain_id().await.context("failed to read chain id")?;
        let dir = args.storage.chain_dir(chain_id);
        info!(
            target: "archiver",
            chain_id,
            dir = %dir.display(),
            sink = ?args.storage.sink,
            include_traces = config.include_traces,
            "Archiving chain"
        );

        let source = Arc::new(BlockFetcher::from_config(rpc, &config));
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_shutdown(cancel.clone()));

        let summary = match args.storage.sink {
            SinkKind::Files => {
                let sink = ShardedFileSink::open(dir.join("blocks"), args.storage.max_shard_bytes())
                    .context("failed to open shard files")?;
                let watermark = FileWatermark::new(dir.join("watermark"));
                archive(config, source, Arc::new(sink), Arc::new(watermark), cancel).await?
            }
            SinkKind::Mdbx => {
                let sink = Arc::new(
                    MdbxSink::open(&dir.join("mdbx")).context("failed to open MDBX sink")?,
                );
                archive(config, source, Arc::clone(&sink), sink, cancel).await?
            }
            SinkKind::Memory => {
                warn!(target: "archiver", "Memory sink selected, nothing survives this process");
                let sink = Arc::new(MemorySink::new());
                archive(config, source, Arc::clone(&sink), sink, cancel).await?
            }
        };

        info!(
            target: "archiver",
            resumed_from = summary.resumed_from,
            committed = summary.committed,
            last_committed = ?summary.last_committed,
            "Archival finished"
        );
        Ok(())
    }
}

async fn archive<S, K, W>(
    config: ArchiverConfig,
    source: Arc<S>,
    sink: Arc<K>,
    watermark: Arc<W>,
    cancel: CancellationToken,
) -> Result<ArchiveSummary>
where
    S: BlockSource + 'static,
    K: BlockSink + BlockReader + 'static,
    W: WatermarkStore + 'static,
{
    Archiver::new(config, source, sink, watermark)
        .with_cancellation(cancel)
        .run()
        .await
        .context("archival stopped")
}

/// Cancels `cancel` on SIGINT or SIGTERM.
async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "archiver", %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "archiver", %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(target: "archiver", "Shutdown signal received, stopping after the current block");
    cancel.cancel();
}
