//! Worker configuration loading. Same `Raw*`-struct TOML
//! pattern as the Publisher's config module.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub schema_version: u32,
    /// This worker's own hub identity, e.g. `ichub01` — used to filter
    /// Fan-out messages and to tag outgoing Report messages.
    pub host: String,
    pub spool_dir: String,
    pub staging_dir: String,
    pub fanout_url: String,
    pub report_url: String,
    pub keepalive_interval: Duration,
    /// Configurable maximum span for clamping. `None` disables clamping.
    pub max_span_ticks: Option<i64>,
    /// Bound on concurrently in-flight copy jobs; excess requests queue
    /// FIFO.
    pub max_concurrent_copies: usize,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    host: Option<String>,
    spool_dir: Option<String>,
    staging_dir: Option<String>,
    fanout_url: Option<String>,
    report_url: Option<String>,
    keepalive_interval_secs: Option<u64>,
    max_span_ticks: Option<i64>,
    max_concurrent_copies: Option<usize>,
}

pub fn load_config_from_path(path: &Path) -> Result<WorkerConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<WorkerConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/hsiface/worker.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<WorkerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let host = raw
        .host
        .ok_or_else(|| ConfigError::MissingField("host".to_owned()))?;
    if host.is_empty() {
        return Err(ConfigError::InvalidValue("host must not be empty".to_owned()));
    }

    let spool_dir = raw
        .spool_dir
        .ok_or_else(|| ConfigError::MissingField("spool_dir".to_owned()))?;
    let staging_dir = raw
        .staging_dir
        .ok_or_else(|| ConfigError::MissingField("staging_dir".to_owned()))?;

    let max_concurrent_copies = raw.max_concurrent_copies.unwrap_or(4);
    if max_concurrent_copies == 0 {
        return Err(ConfigError::InvalidValue(
            "max_concurrent_copies must be at least 1".to_owned(),
        ));
    }

    Ok(WorkerConfig {
        schema_version,
        host,
        spool_dir,
        staging_dir,
        fanout_url: raw
            .fanout_url
            .unwrap_or_else(|| "ws://127.0.0.1:8180/fanout".to_owned()),
        report_url: raw
            .report_url
            .unwrap_or_else(|| "ws://127.0.0.1:8280/report".to_owned()),
        keepalive_interval: Duration::from_secs(raw.keepalive_interval_secs.unwrap_or(30)),
        max_span_ticks: raw.max_span_ticks,
        max_concurrent_copies,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_valid_config() {
        let cfg = load_config_from_str(
            r#"
            schema_version = 1
            host = "ichub01"
            spool_dir = "/mnt/spool"
            staging_dir = "/mnt/staging"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.host, "ichub01");
        assert_eq!(cfg.max_concurrent_copies, 4);
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(30));
        assert_eq!(cfg.max_span_ticks, None);
    }

    #[test]
    fn rejects_empty_host() {
        let err = load_config_from_str(
            "schema_version = 1\nhost = \"\"\nspool_dir = \"/a\"\nstaging_dir = \"/b\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = load_config_from_str(
            r#"
            schema_version = 1
            host = "ichub01"
            spool_dir = "/a"
            staging_dir = "/b"
            max_concurrent_copies = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn honors_explicit_max_span() {
        let cfg = load_config_from_str(
            r#"
            schema_version = 1
            host = "ichub01"
            spool_dir = "/a"
            staging_dir = "/b"
            max_span_ticks = 600000000000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_span_ticks, Some(600_000_000_000));
    }
}
