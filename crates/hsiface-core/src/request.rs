use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use hsiface_protocol::HubLegState;

use crate::prefix::Prefix;
use crate::tick::Tick;

/// A user-initiated extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: String,
    pub username: String,
    pub start_tick: Tick,
    pub stop_tick: Tick,
    pub prefix: Prefix,
    pub destination_dir: String,
    pub hubs: Option<Vec<String>>,
    pub version: u32,
}

impl Request {
    /// True when the requested window is non-inverted: `start_tick <= stop_tick`.
    pub fn is_valid_range(&self) -> bool {
        self.start_tick <= self.stop_tick
    }
}

/// One hub-leg of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct HubLeg {
    pub host: String,
    pub state: HubLegState,
    /// Set when the leg reaches `Failed`: a human-readable reason.
    pub failure_reason: Option<String>,
    /// True if this leg was created from an out-of-order message rather
    /// than an `INITIAL`.
    pub synthetic: bool,
}

impl HubLeg {
    pub fn new(host: impl Into<String>) -> Self {
        HubLeg {
            host: host.into(),
            state: HubLegState::Initial,
            failure_reason: None,
            synthetic: false,
        }
    }

    pub fn synthetic(host: impl Into<String>, state: HubLegState) -> Self {
        HubLeg {
            host: host.into(),
            state,
            failure_reason: None,
            synthetic: true,
        }
    }
}

/// The durable, Sender-owned record for one request. `expiry_deadline`/`created_at` are process-relative
/// instants here; the store crate is responsible for converting to/from a
/// wall-clock representation suitable for persistence across restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub request_id: String,
    pub prefix: Prefix,
    pub username: String,
    pub start_tick: Tick,
    pub stop_tick: Tick,
    pub destination_dir: String,
    pub hub_legs: BTreeMap<String, HubLeg>,
    pub expiry_deadline: Instant,
    pub created_at: Instant,
    /// Set once any hub-leg has left `Initial`.
    pub in_progress_notified: bool,
    /// Set once an e-mail notification has been sent for this request.
    pub email_sent: bool,
}

impl RequestRecord {
    pub fn new(request: &Request, now: Instant, expire_after: Duration) -> Self {
        RequestRecord {
            request_id: request.request_id.clone(),
            prefix: request.prefix.clone(),
            username: request.username.clone(),
            start_tick: request.start_tick,
            stop_tick: request.stop_tick,
            destination_dir: request.destination_dir.clone(),
            hub_legs: BTreeMap::new(),
            expiry_deadline: now + expire_after,
            created_at: now,
            in_progress_notified: false,
            email_sent: false,
        }
    }

    /// A record is deleted only once every hub-leg has reached a terminal
    /// state, or once its expiry deadline has passed — whichever comes
    /// first.
    pub fn all_legs_terminal(&self) -> bool {
        !self.hub_legs.is_empty() && self.hub_legs.values().all(|l| l.state.is_terminal())
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry_deadline
    }

    /// Split this record's hub-legs into DONE/FAILED sets for the aggregate
    /// status classification sent in the final report.
    pub fn aggregate(&self) -> Aggregate {
        let mut success = Vec::new();
        let mut failed = Vec::new();
        for leg in self.hub_legs.values() {
            match leg.state {
                HubLegState::Done => success.push(leg.host.clone()),
                HubLegState::Failed => failed.push(leg.host.clone()),
                _ => {}
            }
        }
        success.sort();
        failed.sort();
        Aggregate { success, failed }
    }
}

/// Split of hub hosts into DONE/FAILED sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Aggregate {
    pub success: Vec<String>,
    pub failed: Vec<String>,
}

impl Aggregate {
    pub fn is_all_success(&self) -> bool {
        !self.success.is_empty() && self.failed.is_empty()
    }

    pub fn is_all_failed(&self) -> bool {
        self.success.is_empty() && !self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Request {
        Request {
            request_id: "r1".into(),
            username: "u".into(),
            start_tick: Tick(100),
            stop_tick: Tick(200),
            prefix: Prefix::SnAlert,
            destination_dir: "/dest".into(),
            hubs: Some(vec!["ichub01".into(), "ichub66".into()]),
            version: 1,
        }
    }

    #[test]
    fn all_legs_terminal_is_false_when_empty() {
        let rec = RequestRecord::new(&sample_request(), Instant::now(), Duration::from_secs(15));
        assert!(!rec.all_legs_terminal());
    }

    #[test]
    fn aggregate_splits_done_and_failed() {
        let mut rec =
            RequestRecord::new(&sample_request(), Instant::now(), Duration::from_secs(15));
        rec.hub_legs.insert(
            "ichub01".into(),
            HubLeg {
                host: "ichub01".into(),
                state: HubLegState::Done,
                failure_reason: None,
                synthetic: false,
            },
        );
        rec.hub_legs.insert(
            "ichub66".into(),
            HubLeg {
                host: "ichub66".into(),
                state: HubLegState::Failed,
                failure_reason: Some("timeout".into()),
                synthetic: false,
            },
        );
        assert!(rec.all_legs_terminal());
        let agg = rec.aggregate();
        assert_eq!(agg.success, vec!["ichub01".to_string()]);
        assert_eq!(agg.failed, vec!["ichub66".to_string()]);
        assert!(!agg.is_all_success());
        assert!(!agg.is_all_failed());
    }
}
