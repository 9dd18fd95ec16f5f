//! Utilities for spinning up a prometheus metrics server.

use crate::PrometheusError;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{SocketAddr, TcpListener};
use tracing::info;

/// Starts a Prometheus metrics server on `addr` and installs it as the global recorder.
///
/// Port 0 picks a free port. Returns the address actually served.
pub fn init_prometheus_server(addr: SocketAddr) -> Result<SocketAddr, PrometheusError> {
    let addr = if addr.port() == 0 {
        // The exporter binds its own listener, so only borrow a free port here.
        TcpListener::bind(addr)?.local_addr()?
    } else {
        addr
    };

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    info!(target: "prometheus", "Serving metrics at: http://{}", addr);
    Ok(addr)
}
