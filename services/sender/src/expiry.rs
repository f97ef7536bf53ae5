//! Expiry timer thread. Fires at
//! `min_poll_interval` and enqueues a sweep request onto the serializer's
//! input queue — the sweep itself always runs on the serializer thread.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::monitor::{RequestMonitor, SerializerInput};

pub async fn run(monitor: RequestMonitor, min_poll_interval: Duration) {
    let tx = monitor.sender();
    let mut ticker = tokio::time::interval(min_poll_interval);
    loop {
        ticker.tick().await;
        if tx.send(SerializerInput::ExpirySweep(Instant::now())).is_err() {
            warn!("serializer queue closed, stopping expiry timer");
            return;
        }
    }
}
