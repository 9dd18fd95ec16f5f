//! Contains the archiver CLI.

use crate::{
    commands::{RunCommand, VerifyCommand},
    flags::GlobalArgs,
};
use anyhow::Result;
use archiver_cli::cli_styles;
use clap::{Parser, Subcommand};
use std::future::Future;

/// Subcommands for the CLI.
#[derive(Debug, Clone, Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Archives blocks from a node into the local sink.
    Run(RunCommand),
    /// Checks an archive for gaps and inconsistent blocks.
    Verify(VerifyCommand),
}

/// The archiver CLI.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, styles = cli_styles(), long_about = None)]
pub struct Cli {
    /// Global arguments for the CLI.
    #[command(flatten)]
    pub global: GlobalArgs,
    /// The subcommand to run.
    #[command(subcommand)]
    pub subcommand: Commands,
}

impl Cli {
    /// Runs the CLI.
    pub fn run(self) -> Result<()> {
        self.global.log_args.init_tracing()?;
        self.global.metrics.init_metrics()?;

        let Self { global, subcommand } = self;
        Self::run_until_done(async move {
            match subcommand {
                Commands::Run(run) => run.run(&global).await,
                Commands::Verify(verify) => verify.run(&global).await,
            }
        })
    }

    /// Drives `fut` to completion on a fresh runtime.
    pub fn run_until_done<F>(fut: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let rt = Self::tokio_runtime().map_err(|e| anyhow::anyhow!(e))?;
        rt.block_on(fut)
    }

    /// Creates a new default tokio multi-thread [Runtime](tokio::runtime::Runtime) with all
    /// features enabled
    pub fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
}
