//! Metric names and the optional Prometheus exporter.
//!
//! The server records through the `metrics` facade unconditionally; with no
//! recorder installed the calls are no-ops.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::errors::Result;

/// Install the global Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called once at startup, before any metrics are recorded. The
/// exporter runs on its own background thread.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!(%addr, "prometheus exporter listening");
    Ok(())
}

// Metric name constants to avoid typos across modules.

/// Connections admitted into a slot (counter).
pub const CONNECTIONS_TOTAL: &str = "chat_connections_total";
/// Connections rejected because every slot was taken (counter).
pub const CONNECTIONS_REJECTED_TOTAL: &str = "chat_connections_rejected_total";
/// Sessions torn down (counter).
pub const DISCONNECTIONS_TOTAL: &str = "chat_disconnections_total";
/// Sessions currently holding a slot (gauge).
pub const SESSIONS_ACTIVE: &str = "chat_sessions_active";
/// Client lines interpreted (counter, labels: kind).
pub const MESSAGES_TOTAL: &str = "chat_messages_total";
/// Recipients that did not receive a complete line (counter, labels: reason).
pub const BROADCAST_DROPS_TOTAL: &str = "chat_broadcast_drops_total";
/// Completed readiness cycles that dispatched at least one entry (counter).
pub const DISPATCH_CYCLES_TOTAL: &str = "chat_dispatch_cycles_total";
