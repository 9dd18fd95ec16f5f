//! Logging arguments.

use crate::{CliResult, init_tracing_subscriber};
use clap::{ArgAction, Args};
use tracing_subscriber::EnvFilter;

/// Logging arguments shared by every subcommand.
#[derive(Args, Default, Clone, Debug, PartialEq, Eq)]
pub struct LogArgs {
    /// Verbosity level: `-v` for debug, `-vv` for trace.
    #[arg(long = "verbose", short = 'v', action = ArgAction::Count, global = true)]
    pub verbosity: u8,
    /// Log filter directives, overriding the verbosity level for the targets they name.
    #[arg(long = "log.filter", env = "RUST_LOG", global = true)]
    pub filter: Option<String>,
}

impl LogArgs {
    /// Installs the global tracing subscriber.
    pub fn init_tracing(&self) -> CliResult<()> {
        let filter = match &self.filter {
            Some(directives) => Some(
                EnvFilter::builder()
                    .with_default_directive(crate::verbosity_level(self.verbosity).into())
                    .parse(directives)?,
            ),
            None => None,
        };
        init_tracing_subscriber(self.verbosity, filter)
    }
}
