use serde::{Deserialize, Serialize};

/// The canonicalized request published on the Fan-out channel, tagged
/// INITIAL. Every Worker receives every [`FanoutMessage`]; a Worker whose
/// host is outside `hubs` (when present) ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanoutMessage {
    pub request_id: String,
    pub username: String,
    pub prefix: String,
    pub start_ticks: i64,
    pub stop_ticks: i64,
    pub destination_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubs: Option<Vec<String>>,
    pub version: u32,
}

impl FanoutMessage {
    /// Whether a Worker identified by `host` should act on this request.
    pub fn targets(&self, host: &str) -> bool {
        match &self.hubs {
            Some(hubs) => hubs.iter().any(|h| h == host),
            None => true,
        }
    }
}
