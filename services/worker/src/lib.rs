//! Worker: time-range resolution and copy driver.

pub mod config;
pub mod copydriver;
pub mod spool;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hsiface_bus::{fanout::FanoutClient, report::ReportClient};
use tracing::{error, warn};

use copydriver::CopyAgent;

/// Drains the Fan-out subscription and serializes requests through a
/// bounded FIFO, running up to `max_concurrent` copy jobs at once.
/// Each accepted request gets its own `ReportClient` connection so a slow
/// transfer on one job never blocks another job's STARTED/WORKING/DONE
/// cadence.
pub async fn run(
    mut fanout: FanoutClient,
    report_url: String,
    host: String,
    spool_dir: String,
    staging_dir: String,
    max_span_ticks: Option<i64>,
    keepalive_interval: Duration,
    max_concurrent: usize,
    agent: Arc<impl CopyAgent + 'static>,
) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_concurrent));

    loop {
        let request = match fanout.recv().await {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "fan-out subscription lost, worker stopping");
                return;
            }
        };

        let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        let host = host.clone();
        let spool_dir = spool_dir.clone();
        let staging_dir = staging_dir.clone();
        let report_url = report_url.clone();
        let agent = agent.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let mut report = match ReportClient::connect(&report_url).await {
                Ok(client) => client,
                Err(e) => {
                    error!(request_id = %request.request_id, error = %e, "failed to connect to report channel, dropping request");
                    return;
                }
            };

            if let Err(e) = copydriver::drive_request(
                &request,
                &host,
                Path::new(&spool_dir),
                Path::new(&staging_dir),
                max_span_ticks,
                keepalive_interval,
                agent.as_ref(),
                &mut report,
            )
            .await
            {
                warn!(request_id = %request.request_id, error = %e, "failed to report request outcome");
            }
        });
    }
}
