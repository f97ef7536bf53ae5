use serde::{Deserialize, Serialize};

/// The report-message kinds on the Report channel. `RequestError` is sent
/// only by the Publisher, for a request rejected at admission time (e.g. an
/// unknown hub) — it carries no hub-leg lifecycle, just enough to drive a
/// `REQUEST ERROR` status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MsgType {
    Initial,
    Started,
    Working,
    Done,
    Failed,
    #[serde(rename = "REQUEST_ERROR")]
    RequestError,
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MsgType::Initial => "INITIAL",
            MsgType::Started => "STARTED",
            MsgType::Working => "WORKING",
            MsgType::Done => "DONE",
            MsgType::Failed => "FAILED",
            MsgType::RequestError => "REQUEST_ERROR",
        };
        f.write_str(s)
    }
}

/// A single hub-leg's lifecycle state.
///
/// Distinct from [`MsgType`]: a message is an event, a `HubLegState` is the
/// state that event drives the leg into. `Initial` maps to `Initial`, but
/// `Working` does not introduce a new state (it only touches the deadline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HubLegState {
    Initial,
    Queued,
    InProgress,
    Done,
    Failed,
}

impl HubLegState {
    /// Ordinal used to check monotonicity.
    pub fn rank(self) -> u8 {
        match self {
            HubLegState::Initial => 0,
            HubLegState::Queued => 1,
            HubLegState::InProgress => 2,
            HubLegState::Done | HubLegState::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HubLegState::Done | HubLegState::Failed)
    }
}

/// Report message carried on the Report channel.
///
/// `start_ticks`/`stop_ticks` are absent (serialize as `null`) on `WORKING`
/// messages; every other message type carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub msgtype: MsgType,
    pub request_id: String,
    pub username: String,
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ticks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_ticks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_dir: Option<String>,
    pub destination_dir: String,
    #[serde(default)]
    pub extract: bool,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubs: Option<Vec<String>>,
    pub version: u32,
    /// Present only on `FAILED`; carries a human-readable reason
    /// ("data not in spool", "timeout", transport error text, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReportMessage {
    /// Schema check: `msgtype`, `request_id` are always
    /// required; `start_ticks`/`stop_ticks` are required for everything but
    /// `WORKING` and `REQUEST_ERROR` (neither has a resolved tick range).
    pub fn validate_schema(&self) -> Result<(), SchemaViolation> {
        if self.request_id.is_empty() {
            return Err(SchemaViolation::MissingField("request_id"));
        }
        if !matches!(self.msgtype, MsgType::Working | MsgType::RequestError) {
            if self.start_ticks.is_none() {
                return Err(SchemaViolation::MissingField("start_ticks"));
            }
            if self.stop_ticks.is_none() {
                return Err(SchemaViolation::MissingField("stop_ticks"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
