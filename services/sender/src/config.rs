//! Sender configuration loading.

use chrono::Datelike;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub schema_version: u32,
    pub report_bind: String,
    pub cluster_name: String,
    pub state_dir: String,
    pub spade_dir: String,
    pub expire_seconds: Duration,
    pub min_poll_interval: Duration,
    pub write_meta_xml: bool,
    pub alert_email_dev: Vec<String>,
    pub alert_email_sn: Vec<String>,
    /// The UTC year ticks in this deployment are zeroed against. Defaults
    /// to the current year at startup.
    pub tick_anchor_year: i32,
    pub max_concurrent_packaging: usize,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    report_bind: Option<String>,
    cluster_name: Option<String>,
    state_dir: Option<String>,
    spade_dir: Option<String>,
    expire_seconds: Option<u64>,
    min_poll_interval_secs: Option<u64>,
    write_meta_xml: Option<bool>,
    alert_email_dev: Option<Vec<String>>,
    alert_email_sn: Option<Vec<String>>,
    tick_anchor_year: Option<i32>,
    max_concurrent_packaging: Option<usize>,
}

pub fn load_config_from_path(path: &Path) -> Result<SenderConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<SenderConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/hsiface/sender.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<SenderConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let state_dir = raw
        .state_dir
        .ok_or_else(|| ConfigError::MissingField("state_dir".to_owned()))?;
    let spade_dir = raw
        .spade_dir
        .ok_or_else(|| ConfigError::MissingField("spade_dir".to_owned()))?;

    let max_concurrent_packaging = raw.max_concurrent_packaging.unwrap_or(4);
    if max_concurrent_packaging == 0 {
        return Err(ConfigError::InvalidValue(
            "max_concurrent_packaging must be at least 1".to_owned(),
        ));
    }

    Ok(SenderConfig {
        schema_version,
        report_bind: raw.report_bind.unwrap_or_else(|| "0.0.0.0:8280".to_owned()),
        cluster_name: raw.cluster_name.unwrap_or_else(|| "icecube".to_owned()),
        state_dir,
        spade_dir,
        expire_seconds: Duration::from_secs(raw.expire_seconds.unwrap_or(15)),
        min_poll_interval: Duration::from_secs(raw.min_poll_interval_secs.unwrap_or(1)),
        write_meta_xml: raw.write_meta_xml.unwrap_or(false),
        alert_email_dev: raw.alert_email_dev.unwrap_or_default(),
        alert_email_sn: raw.alert_email_sn.unwrap_or_default(),
        tick_anchor_year: raw
            .tick_anchor_year
            .unwrap_or_else(|| chrono::Utc::now().year()),
        max_concurrent_packaging,
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
