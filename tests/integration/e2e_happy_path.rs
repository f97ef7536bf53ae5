//! End-to-End Integration Harness: Publisher -> Worker(s) -> Sender pipeline.
//!
//! Spins up all three processes in-process, each bound to `127.0.0.1:0`:
//!   1. Sender: owns the Report channel ingest socket and the serializer.
//!   2. Publisher: owns the Alert (HTTP) and Fan-out (broadcast) sockets,
//!      reporting INITIAL to the Sender.
//!   3. Two Workers (`ichub01`, `ichub66`), each subscribed to the Fan-out
//!      channel and backed by its own spool fixture, driving a stub copy
//!      agent instead of shelling out to a real transfer tool.
//!
//! Drives the pipeline with a single HTTP POST to the Publisher's `/alert`
//! endpoint and asserts the happy-path status sequence and SPADE output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hsiface_bus::alert;
use hsiface_bus::fanout::{FanoutClient, FanoutHub};
use hsiface_bus::report::{ReportClient, ReportIngest};
use hsiface_core::RequestMonitorState;
use hsiface_protocol::AlertRequest;
use hsiface_store::{ProcessClock, Store};
use hsiface_test_utils::spool::{SliceSpec, SpoolFixture};
use publisher::Publisher;
use sender::monitor::{self, MonitorConfig};
use sender::notify::JsonlNotificationSink;
use sender::packaging::PackagingPool;
use worker::copydriver::{CopyAgent, CopyAgentError};
use tempfile::TempDir;

/// Stub copy agent standing in for the real external transfer tool: copies
/// the staged files straight into `<destination_dir>/<host>`, which is
/// exactly where the real agent's target process is expected to land them.
struct LocalCopyAgent {
    host: String,
}

impl CopyAgent for LocalCopyAgent {
    async fn transfer(&self, staging_dir: &Path, destination_dir: &str) -> Result<(), CopyAgentError> {
        let dest = Path::new(destination_dir).join(&self.host);
        std::fs::create_dir_all(&dest).map_err(|e| CopyAgentError::Failed(e.to_string()))?;
        for entry in std::fs::read_dir(staging_dir).map_err(|e| CopyAgentError::Failed(e.to_string()))? {
            let entry = entry.map_err(|e| CopyAgentError::Failed(e.to_string()))?;
            std::fs::copy(entry.path(), dest.join(entry.file_name()))
                .map_err(|e| CopyAgentError::Failed(e.to_string()))?;
        }
        Ok(())
    }
}

async fn start_sender(spade_dir: PathBuf) -> (std::net::SocketAddr, TempDir) {
    let state_dir = TempDir::new().unwrap();
    let notifications_path = state_dir.path().join("notifications.jsonl");

    let clock = ProcessClock::started_now();
    let store = Store::open_in_memory(clock).unwrap();
    let state = RequestMonitorState::new(Duration::from_secs(15));
    let notify_sink: Arc<dyn sender::notify::NotificationSink> =
        Arc::new(JsonlNotificationSink::new(notifications_path.clone()));
    let packaging = PackagingPool::new(4);
    let monitor_cfg = MonitorConfig {
        cluster_name: "icecube".to_owned(),
        spade_dir,
        write_meta_xml: false,
        tick_anchor_year: 2026,
        alert_email_dev: vec![],
        alert_email_sn: vec!["sn-ops@example.org".to_owned()],
    };

    let (request_monitor, _serializer_handle) =
        monitor::spawn(state, store, clock, notify_sink, packaging, monitor_cfg);
    tokio::spawn(sender::expiry::run(request_monitor.clone(), Duration::from_millis(50)));

    let (report_tx, report_rx) = tokio::sync::mpsc::channel(1024);
    tokio::spawn(sender::bridge_reports(report_rx, request_monitor.sender()));

    let ingest = ReportIngest::new(report_tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, ingest.router()).await.expect("sender server error");
    });

    (addr, state_dir)
}

async fn start_publisher(sender_report_url: &str, known_hubs: Vec<String>) -> std::net::SocketAddr {
    let report_client = ReportClient::connect(sender_report_url).await.unwrap();
    let fanout = FanoutHub::new(1024);
    let publisher = Publisher::new(known_hubs, "ANON".to_owned(), fanout.clone(), report_client);

    let app = fanout.router().merge(alert::router(publisher));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("publisher server error");
    });
    addr
}

/// Spawns a worker as a background task. Returns the staging `TempDir` so
/// the caller can keep it alive for the worker's lifetime — `worker::run`
/// never returns on its own.
async fn start_worker(
    fanout_url: &str,
    report_url: &str,
    host: &str,
    spool_dir: PathBuf,
) -> TempDir {
    let fanout = FanoutClient::connect(fanout_url, host.to_owned()).await.unwrap();
    let agent = Arc::new(LocalCopyAgent { host: host.to_owned() });
    let staging = TempDir::new().unwrap();
    let staging_path = staging.path().display().to_string();
    tokio::spawn(worker::run(
        fanout,
        report_url.to_owned(),
        host.to_owned(),
        spool_dir.display().to_string(),
        staging_path,
        None,
        Duration::from_secs(30),
        4,
        agent,
    ));
    staging
}

/// A two-hub request succeeds on both legs. Expects QUEUED, exactly one
/// IN PROGRESS, then SUCCESS with `success="1,66"`, and one tar/semaphore
/// pair per hub landed in the SPADE directory.
#[tokio::test]
async fn e2e_two_hub_request_succeeds() {
    let spade_dir = TempDir::new().unwrap();
    let destination_dir = TempDir::new().unwrap();

    let (sender_addr, state_dir) = start_sender(spade_dir.path().to_path_buf()).await;
    let notifications_path = state_dir.path().join("notifications.jsonl");
    let report_url = format!("ws://{sender_addr}/report");

    let publisher_addr = start_publisher(&report_url, vec!["ichub01".to_owned(), "ichub66".to_owned()]).await;
    let fanout_url = format!("ws://{publisher_addr}/fanout");

    let spool_01 = SpoolFixture::build(&[SliceSpec { n: 0, start_tick: 0, stop_tick: 999 }], 0);
    let spool_66 = SpoolFixture::build(&[SliceSpec { n: 0, start_tick: 0, stop_tick: 999 }], 0);
    let _staging_01 = start_worker(&fanout_url, &report_url, "ichub01", spool_01.path()).await;
    let _staging_66 = start_worker(&fanout_url, &report_url, "ichub66", spool_66.path()).await;

    // Give the Fan-out subscribers a moment to register before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = AlertRequest {
        start: 0,
        stop: 100,
        copy: destination_dir.path().display().to_string(),
        request_id: Some("e2e-r1".to_owned()),
        username: "operator".to_owned(),
        prefix: Some("SNALERT".to_owned()),
        hubs: None,
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{publisher_addr}/alert"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // Poll the SPADE directory until both hub legs have packaged, or time out.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let entries: Vec<_> = std::fs::read_dir(spade_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        if entries.len() >= 4 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for SPADE output, found {} entries", entries.len());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(spade_dir.path().join("HS_SNALERT_0_ichub01.tar").exists());
    assert!(spade_dir.path().join("HS_SNALERT_0_ichub01.sem").exists());
    assert!(spade_dir.path().join("HS_SNALERT_0_ichub66.tar").exists());
    assert!(spade_dir.path().join("HS_SNALERT_0_ichub66.sem").exists());

    // Give the terminal status notification a moment to land after packaging
    // was submitted (packaging is fired off in parallel with the status
    // write, not ordered after it).
    tokio::time::sleep(Duration::from_millis(100)).await;

    let notifications = std::fs::read_to_string(&notifications_path).unwrap();
    let lines: Vec<serde_json::Value> = notifications
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    let statuses: Vec<&str> = lines
        .iter()
        .filter_map(|v| v.get("value")?.get("status")?.as_str())
        .collect();
    assert!(statuses.contains(&"QUEUED"), "statuses: {statuses:?}");
    assert_eq!(statuses.iter().filter(|s| **s == "IN PROGRESS").count(), 1, "statuses: {statuses:?}");
    assert!(statuses.contains(&"SUCCESS"), "statuses: {statuses:?}");

    let success_line = lines
        .iter()
        .find(|v| v.get("value").and_then(|v| v.get("status")).and_then(|s| s.as_str()) == Some("SUCCESS"))
        .expect("a SUCCESS status notification");
    assert_eq!(
        success_line["value"]["success"].as_str(),
        Some("1,66"),
    );
}
