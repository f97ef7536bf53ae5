//! Publisher: admission and fan-out.

pub mod admission;
pub mod config;

use std::sync::Arc;

use hsiface_bus::{alert::AlertHandler, fanout::FanoutHub, report::ReportClient};
use hsiface_protocol::{AlertError, AlertRequest, MsgType, ReportMessage, CURRENT_VERSION};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Ties admission logic to the two outbound channels: the Fan-out
/// broadcast hub this process hosts, and the Report-channel client
/// connection to the Sender.
#[derive(Clone)]
pub struct Publisher {
    known_hubs: Arc<Vec<String>>,
    default_prefix: Arc<String>,
    fanout: FanoutHub,
    report: Arc<Mutex<ReportClient>>,
}

impl Publisher {
    pub fn new(known_hubs: Vec<String>, default_prefix: String, fanout: FanoutHub, report: ReportClient) -> Self {
        Publisher {
            known_hubs: Arc::new(known_hubs),
            default_prefix: Arc::new(default_prefix),
            fanout,
            report: Arc::new(Mutex::new(report)),
        }
    }

    pub fn fanout_hub(&self) -> &FanoutHub {
        &self.fanout
    }

    /// Sends a `REQUEST_ERROR` report for a request rejected at admission,
    /// before any `RequestRecord` was ever created on the Sender side.
    async fn emit_request_error(&self, request_id: &str, username: &str, prefix: &str, destination_dir: &str) {
        let reject = ReportMessage {
            msgtype: MsgType::RequestError,
            request_id: request_id.to_owned(),
            username: username.to_owned(),
            prefix: prefix.to_owned(),
            start_ticks: None,
            stop_ticks: None,
            copy_dir: None,
            destination_dir: destination_dir.to_owned(),
            extract: false,
            host: String::new(),
            hubs: None,
            version: CURRENT_VERSION,
            reason: None,
        };
        let mut report = self.report.lock().await;
        if let Err(e) = report.send(&reject).await {
            warn!(request_id, error = %e, "failed to emit REQUEST_ERROR to sender");
        }
    }
}

impl AlertHandler for Publisher {
    async fn handle(&self, request: AlertRequest) -> Result<(), AlertError> {
        // Captured before `admit` consumes `request`: an UnknownHub rejection
        // still needs these to emit a REQUEST_ERROR notification, and admit()
        // never reaches its own request_id/prefix computation on that path.
        let rejected_username = request.username.clone();
        let rejected_destination_dir = request.copy.clone();
        let rejected_prefix = request
            .prefix
            .clone()
            .unwrap_or_else(|| (*self.default_prefix).clone());
        let rejected_request_id = request.request_id.clone();

        let admitted = match admission::admit(request, &self.known_hubs, &self.default_prefix, || {
            Uuid::new_v4().to_string()
        }) {
            Ok(admitted) => admitted,
            Err(e @ AlertError::UnknownHub(_)) => {
                let request_id = rejected_request_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                self.emit_request_error(
                    &request_id,
                    &rejected_username,
                    &rejected_prefix,
                    &rejected_destination_dir,
                )
                .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // If the outbound socket to the sender is unavailable, the request
        // never reaches the monitor, so the reply must fail too. Surfaced as
        // a generic admission error rather than a distinct AlertError
        // variant: from the client's point of view both are "your request
        // was not accepted".
        let mut report = self.report.lock().await;
        if let Err(e) = report.send(&admitted.initial).await {
            warn!(request_id = %admitted.request_id, error = %e, "failed to emit INITIAL to sender");
            return Err(AlertError::Unavailable("report channel".to_owned()));
        }
        drop(report);

        let subscribers = self.fanout.publish(admitted.fanout);
        info!(
            request_id = %admitted.request_id,
            subscribers,
            "request admitted"
        );
        Ok(())
    }
}
