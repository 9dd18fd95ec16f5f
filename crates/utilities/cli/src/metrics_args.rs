//! Prometheus metrics arguments.

use crate::{CliResult, init_prometheus_server};
use clap::Args;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Configuration for the Prometheus exporter.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct MetricsArgs {
    /// Port to serve Prometheus metrics on. Metrics are disabled when unset.
    #[arg(long = "metrics.port", env = "METRICS_PORT")]
    pub port: Option<u16>,
    /// Address to serve Prometheus metrics on.
    #[arg(
        long = "metrics.addr",
        env = "METRICS_ADDR",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    )]
    pub addr: IpAddr,
}

impl Default for MetricsArgs {
    fn default() -> Self {
        Self { port: None, addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED) }
    }
}

impl MetricsArgs {
    /// Starts the exporter if a port is configured and returns the address it serves on.
    pub fn init_metrics(&self) -> CliResult<Option<SocketAddr>> {
        let Some(port) = self.port else {
            return Ok(None);
        };
        Ok(Some(init_prometheus_server(SocketAddr::new(self.addr, port))?))
    }
}
