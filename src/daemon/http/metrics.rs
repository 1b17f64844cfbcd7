//! Prometheus metrics for the daemon.

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Counter of queue operations, labelled by operation and channel.
pub const QUEUE_OPERATIONS: &str = "tinyq_queue_operations_total";

/// Installs the global Prometheus recorder. Can only succeed once per
/// process.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

pub(crate) fn record_queue_operation(operation: &'static str, channel: &str) {
    ::metrics::counter!(
        QUEUE_OPERATIONS,
        "operation" => operation,
        "channel" => channel.to_string()
    )
    .increment(1);
}
