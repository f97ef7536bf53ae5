use std::sync::Arc;

use hsiface_bus::fanout::FanoutClient;
use tracing_subscriber::EnvFilter;
use worker::config;
use worker::copydriver::ExternalCommandAgent;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "worker starting");

    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let fanout = FanoutClient::connect(&cfg.fanout_url, cfg.host.clone())
        .await
        .unwrap_or_else(|e| panic!("failed to connect to publisher fan-out at {}: {e}", cfg.fanout_url));

    let agent = Arc::new(ExternalCommandAgent {
        program: "rsync".to_owned(),
        args: vec!["-a".to_owned()],
    });

    worker::run(
        fanout,
        cfg.report_url,
        cfg.host,
        cfg.spool_dir,
        cfg.staging_dir,
        cfg.max_span_ticks,
        cfg.keepalive_interval,
        cfg.max_concurrent_copies,
        agent,
    )
    .await;
}
