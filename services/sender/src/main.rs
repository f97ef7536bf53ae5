use std::path::{Path, PathBuf};
use std::sync::Arc;

use hsiface_bus::report::ReportIngest;
use hsiface_core::RequestMonitorState;
use hsiface_store::{ProcessClock, Store};
use sender::config;
use sender::monitor::{self, MonitorConfig};
use sender::notify::JsonlNotificationSink;
use sender::packaging::PackagingPool;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sender starting");

    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    std::fs::create_dir_all(&cfg.state_dir).expect("failed to create state directory");
    std::fs::create_dir_all(&cfg.spade_dir).expect("failed to create SPADE directory");

    let clock = ProcessClock::started_now();
    let db_path = Path::new(&cfg.state_dir).join("hsrequests.db");
    let store = Store::open(&db_path, clock).unwrap_or_else(|e| panic!("failed to open request store at {}: {e}", db_path.display()));
    let existing = store
        .load_all()
        .unwrap_or_else(|e| panic!("failed to load persisted requests: {e}"));
    tracing::info!(restored = existing.len(), "restored requests from durable state");

    let state = RequestMonitorState::restore(existing, cfg.expire_seconds);
    let notify_sink: Arc<dyn sender::notify::NotificationSink> =
        Arc::new(JsonlNotificationSink::new(Path::new(&cfg.state_dir).join("notifications.jsonl")));
    let packaging = PackagingPool::new(cfg.max_concurrent_packaging);

    let monitor_cfg = MonitorConfig {
        cluster_name: cfg.cluster_name.clone(),
        spade_dir: PathBuf::from(&cfg.spade_dir),
        write_meta_xml: cfg.write_meta_xml,
        tick_anchor_year: cfg.tick_anchor_year,
        alert_email_dev: cfg.alert_email_dev.clone(),
        alert_email_sn: cfg.alert_email_sn.clone(),
    };

    let (request_monitor, _serializer_handle) =
        monitor::spawn(state, store, clock, notify_sink, packaging, monitor_cfg);

    tokio::spawn(sender::expiry::run(request_monitor.clone(), cfg.min_poll_interval));

    let (report_tx, report_rx) = tokio::sync::mpsc::channel(1024);
    tokio::spawn(sender::bridge_reports(report_rx, request_monitor.sender()));

    let ingest = ReportIngest::new(report_tx);
    let listener = tokio::net::TcpListener::bind(&cfg.report_bind)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", cfg.report_bind));
    tracing::info!(addr = %cfg.report_bind, "sender listening");
    axum::serve(listener, ingest.router())
        .await
        .expect("sender server error");
}
