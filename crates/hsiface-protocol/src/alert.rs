use serde::{Deserialize, Serialize};

/// Inbound request on the Alert channel.
///
/// `start`/`stop` arrive in nanoseconds over the wire; the Publisher converts
/// them to ticks (×10) during canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub start: i64,
    pub stop: i64,
    pub copy: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub hubs: Option<serde_json::Value>,
}

/// Outcome of validating an [`AlertRequest`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlertError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("start must be <= stop")]
    StartAfterStop,
    #[error("hubs must be a list of hub identifiers, got {0}")]
    BadHubsShape(String),
    #[error("unknown hub: {0}")]
    UnknownHub(String),
    #[error("outbound channel unavailable: {0}")]
    Unavailable(String),
}

/// Reply on the Alert channel: either the literal `DONE\0` bytes, or a JSON
/// error envelope `{"error": "..."}`.
///
/// The two variants use different wire shapes (raw bytes vs. JSON), so this
/// type is not itself `(De)Serialize` — the HTTP layer matches on it and
/// picks the appropriate response body.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertReply {
    Done,
    Error(AlertErrorBody),
}

/// JSON body for the error case: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertErrorBody {
    pub error: String,
}

impl AlertReply {
    pub fn error(err: &AlertError) -> Self {
        AlertReply::Error(AlertErrorBody {
            error: err.to_string(),
        })
    }
}
