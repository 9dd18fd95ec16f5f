//! Global arguments for the CLI.

use crate::flags::StorageArgs;
use archiver_cli::{LogArgs, MetricsArgs};
use clap::Parser;

/// Global arguments for the CLI.
#[derive(Parser, Default, Clone, Debug)]
pub struct GlobalArgs {
    /// Logging arguments.
    #[command(flatten)]
    pub log_args: LogArgs,
    /// Prometheus CLI arguments.
    #[command(flatten)]
    pub metrics: MetricsArgs,
    /// Where archived blocks live.
    #[command(flatten)]
    pub storage: StorageArgs,
}
