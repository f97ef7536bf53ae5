use std::env;

use hsiface_bus::{alert, fanout::FanoutHub, report::ReportClient};
use publisher::{config, Publisher};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "publisher starting");

    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let report_url =
        env::var("HSIFACE_SENDER_REPORT_URL").unwrap_or_else(|_| "ws://127.0.0.1:8280/report".to_owned());
    let report_client = ReportClient::connect(&report_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to sender report channel at {report_url}: {e}"));

    let fanout = FanoutHub::new(1024);
    let publisher = Publisher::new(cfg.known_hubs, cfg.default_prefix, fanout.clone(), report_client);

    let app = fanout.router().merge(alert::router(publisher));
    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", cfg.bind));
    info!(addr = %cfg.bind, "publisher listening");
    axum::serve(listener, app)
        .await
        .expect("publisher server error");
}
