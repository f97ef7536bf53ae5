//! Publisher configuration loading. TOML is the sole config source: a
//! `Raw*` deserialization layer with every field optional, then a
//! validated, fully-populated public config type.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub schema_version: u32,
    pub bind: String,
    pub known_hubs: Vec<String>,
    pub default_prefix: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    bind: Option<String>,
    known_hubs: Option<Vec<String>>,
    default_prefix: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<PublisherConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<PublisherConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/hsiface/publisher.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<PublisherConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let known_hubs = raw
        .known_hubs
        .ok_or_else(|| ConfigError::MissingField("known_hubs".to_owned()))?;
    if known_hubs.is_empty() {
        return Err(ConfigError::InvalidValue(
            "at least one known hub is required".to_owned(),
        ));
    }

    Ok(PublisherConfig {
        schema_version,
        bind: raw.bind.unwrap_or_else(|| "0.0.0.0:8180".to_owned()),
        known_hubs,
        default_prefix: raw.default_prefix.unwrap_or_else(|| "ANON".to_owned()),
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
