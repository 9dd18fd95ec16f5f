//! Tracing subscriber setup.

use crate::{CliError, CliResult};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Maps the number of `-v` flags to a level: none is `INFO`, one is `DEBUG`, more is `TRACE`.
pub const fn verbosity_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global `fmt` subscriber.
///
/// Without an explicit filter, `RUST_LOG` is read and the verbosity level applies to every
/// target it does not mention.
pub fn init_tracing_subscriber(
    verbosity: u8,
    env_filter: Option<impl Into<EnvFilter>>,
) -> CliResult<()> {
    let filter = match env_filter {
        Some(filter) => filter.into(),
        None => EnvFilter::builder()
            .with_default_directive(verbosity_level(verbosity).into())
            .from_env_lossy(),
    };

    tracing_subscriber::fmt().with_env_filter(filter).try_init().map_err(CliError::Tracing)
}
