//! Sender: the request aggregation state machine and packaging handoff.

pub mod config;
pub mod expiry;
pub mod monitor;
pub mod notify;
pub mod packaging;

use std::time::Instant;

use hsiface_protocol::ReportMessage;
use tracing::warn;

use monitor::SerializerInput;

/// Bridges the async `ReportIngest` sink (fed by every inbound Report
/// WebSocket connection) onto the serializer's synchronous input queue,
/// stamping each message with its arrival time.
pub async fn bridge_reports(
    mut rx: tokio::sync::mpsc::Receiver<ReportMessage>,
    tx: std::sync::mpsc::Sender<SerializerInput>,
) {
    while let Some(msg) = rx.recv().await {
        if tx.send(SerializerInput::Report(msg, Instant::now())).is_err() {
            warn!("serializer queue closed, stopping report bridge");
            return;
        }
    }
}
