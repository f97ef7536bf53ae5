//! The `RequestMonitor` serializer thread. This is the one place mutable request state lives; it
//! is a plain `std::thread`, not a tokio task, so it can never be
//! preempted by the async runtime mid-transition — the only blocking point
//! is the channel recv itself.

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Instant;

use hsiface_core::{Outcome, RequestMonitorState};
use hsiface_protocol::ReportMessage;
use hsiface_store::{ProcessClock, Store};
use tracing::{error, info, warn};

use crate::notify::{self, NotificationSink};
use crate::packaging::{PackagingJob, PackagingPool};

/// What a producer thread enqueues. Both the Report socket readers and the
/// expiry timer are producers onto the same queue.
pub enum SerializerInput {
    Report(ReportMessage, Instant),
    ExpirySweep(Instant),
}

pub struct MonitorConfig {
    pub cluster_name: String,
    pub spade_dir: PathBuf,
    pub write_meta_xml: bool,
    pub tick_anchor_year: i32,
    pub alert_email_dev: Vec<String>,
    pub alert_email_sn: Vec<String>,
}

/// Handle to the running serializer thread: a cloneable sender onto its
/// input queue.
#[derive(Clone)]
pub struct RequestMonitor {
    tx: std_mpsc::Sender<SerializerInput>,
}

impl RequestMonitor {
    pub fn sender(&self) -> std_mpsc::Sender<SerializerInput> {
        self.tx.clone()
    }
}

/// Spawns the serializer thread and returns a handle plus its `JoinHandle`.
/// `store`/`clock` are moved in: the store is owned exclusively by this
/// thread from this point on.
pub fn spawn(
    mut state: RequestMonitorState,
    mut store: Store,
    clock: ProcessClock,
    notify_sink: Arc<dyn NotificationSink>,
    packaging: PackagingPool,
    cfg: MonitorConfig,
) -> (RequestMonitor, std::thread::JoinHandle<()>) {
    let (tx, rx) = std_mpsc::channel();
    let handle = std::thread::spawn(move || {
        for input in rx {
            match input {
                SerializerInput::Report(msg, arrival) => {
                    handle_report(&mut state, &mut store, &clock, &notify_sink, &packaging, &cfg, msg, arrival);
                }
                SerializerInput::ExpirySweep(now) => {
                    handle_expiry(&mut state, &mut store, &clock, &notify_sink, &packaging, &cfg, now);
                }
            }
        }
        info!("serializer input queue closed, monitor thread exiting");
    });
    (RequestMonitor { tx }, handle)
}

fn handle_report(
    state: &mut RequestMonitorState,
    store: &mut Store,
    clock: &ProcessClock,
    notify_sink: &Arc<dyn NotificationSink>,
    packaging: &PackagingPool,
    cfg: &MonitorConfig,
    msg: ReportMessage,
    arrival: Instant,
) {
    if let Err(e) = msg.validate_schema() {
        warn!(error = %e, request_id = %msg.request_id, "malformed report message, dropping");
        return;
    }

    let outcomes = match state.apply(&msg, arrival) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            warn!(error = %e, request_id = %msg.request_id, "rejected report message");
            return;
        }
    };

    for outcome in outcomes {
        apply_outcome(state, store, clock, notify_sink, packaging, cfg, outcome);
    }
}

fn handle_expiry(
    state: &mut RequestMonitorState,
    store: &mut Store,
    clock: &ProcessClock,
    notify_sink: &Arc<dyn NotificationSink>,
    packaging: &PackagingPool,
    cfg: &MonitorConfig,
    now: Instant,
) {
    let outcomes = state.sweep_expired(now);
    for outcome in outcomes {
        apply_outcome(state, store, clock, notify_sink, packaging, cfg, outcome);
    }
}

fn apply_outcome(
    state: &RequestMonitorState,
    store: &mut Store,
    clock: &ProcessClock,
    notify_sink: &Arc<dyn NotificationSink>,
    packaging: &PackagingPool,
    cfg: &MonitorConfig,
    outcome: Outcome,
) {
    let now_str = clock.to_utc(Instant::now()).format("%Y-%m-%d %H:%M:%S").to_string();

    match outcome {
        Outcome::Dropped { detail } => {
            warn!(detail, "report message dropped");
        }
        Outcome::Duplicate { request_id } => {
            info!(request_id, "duplicate message, no-op");
        }
        Outcome::Late { request_id } => {
            warn!(request_id, "late message for a request that already completed");
        }
        Outcome::Created { request_id } => {
            let Some(record) = state.get(&request_id) else { return };
            if let Err(e) = store.upsert(record) {
                error!(request_id, error = %e, "failed to persist new request, exiting");
                std::process::exit(1);
            }
            notify_sink.send_status(&notify::queued_status(record, cfg.tick_anchor_year, &now_str));
            notify_sink.send_email(&notify::request_email(
                record,
                &cfg.cluster_name,
                &cfg.alert_email_dev,
                &cfg.alert_email_sn,
                &now_str,
            ));
        }
        Outcome::CreatedSynthetic { request_id, host } => {
            warn!(request_id, host, "synthetic record created, was not initialized");
            if let Some(record) = state.get(&request_id) {
                if let Err(e) = store.upsert(record) {
                    error!(request_id, error = %e, "failed to persist synthetic request, exiting");
                    std::process::exit(1);
                }
            }
        }
        Outcome::LegTransitioned { request_id, host, to, first_in_progress } => {
            info!(request_id, host, ?to, "hub-leg transitioned");
            let Some(record) = state.get(&request_id) else { return };
            if let Err(e) = store.upsert(record) {
                error!(request_id, error = %e, "failed to persist leg transition, exiting");
                std::process::exit(1);
            }
            if first_in_progress {
                notify_sink.send_status(&notify::in_progress_status(record, cfg.tick_anchor_year, &now_str));
            }
        }
        Outcome::RequestRejected { request_id, username, prefix, destination_dir } => {
            warn!(request_id, "request rejected at admission, emitting REQUEST ERROR status");
            notify_sink.send_status(&notify::request_error_status(
                &request_id,
                &username,
                &prefix,
                &destination_dir,
                &now_str,
            ));
        }
        Outcome::RequestCompleted { record, aggregate } => {
            let request_id = record.request_id.clone();
            if let Err(e) = store.delete(&request_id) {
                error!(request_id, error = %e, "failed to delete completed request, exiting");
                std::process::exit(1);
            }
            notify_sink.send_status(&notify::terminal_status(&record, &aggregate, cfg.tick_anchor_year, &now_str));
            for host in &aggregate.success {
                let timetag = record.start_tick.0;
                let basename = format!("{}_{}_{}", record.prefix.as_str(), timetag, host);
                packaging.submit(PackagingJob {
                    source_dir: PathBuf::from(&record.destination_dir).join(host),
                    spade_dir: cfg.spade_dir.clone(),
                    write_meta_xml: cfg.write_meta_xml,
                    basename,
                });
            }
        }
    }
}
