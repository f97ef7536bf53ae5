//! The `RequestMonitor` transition table, in pure form: no
//! sockets, no clock, no filesystem. [`RequestMonitorState::apply`] is the
//! one function the Sender's serializer thread calls for every dequeued
//! message; it returns an [`Outcome`] describing exactly which side effects
//! (status emission, e-mail, persistence, packaging) the impure shell must
//! perform. Keeping this pure is what makes properties like monotonicity,
//! commutativity across hubs, and idempotence checkable with plain unit
//! tests instead of a running socket stack.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use hsiface_protocol::{HubLegState, MsgType, ReportMessage, CURRENT_VERSION};

use crate::prefix::Prefix;
use crate::request::{Aggregate, HubLeg, RequestRecord};
use crate::tick::Tick;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("message version {got} is older than current version {current}")]
    StaleVersion { got: u32, current: u32 },
}

/// What the impure shell must do in response to one applied message.
/// Several may be emitted for a single message (e.g. a DONE that both
/// transitions a leg and completes the request).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Logged at WARN and otherwise ignored; no state changed.
    Dropped { detail: String },
    /// A brand-new [`RequestRecord`] was created from an `INITIAL` message.
    /// The shell must persist it, emit `QUEUED`, and send the one-shot
    /// e-mail.
    Created { request_id: String },
    /// A `RequestRecord` was created from a non-`INITIAL` message because
    /// none existed yet. No
    /// `QUEUED` status and no e-mail are emitted for this path.
    CreatedSynthetic { request_id: String, host: String },
    /// A duplicate message that changed nothing: the leg was already in the
    /// reported state.
    Duplicate { request_id: String },
    /// A message for a request that doesn't exist anymore, i.e. it already
    /// reached a terminal state and was deleted. Logged as late and
    /// ignored.
    Late { request_id: String },
    /// A hub-leg moved to a new state. `first_in_progress` is true exactly
    /// once per request: the first time any leg leaves `Initial`.
    LegTransitioned {
        request_id: String,
        host: String,
        to: HubLegState,
        first_in_progress: bool,
    },
    /// A request rejected at admission time before any `RequestRecord` was
    /// ever created (e.g. an unknown hub). No persistence, no packaging —
    /// just a terminal `REQUEST ERROR` status.
    RequestRejected {
        request_id: String,
        username: String,
        prefix: String,
        destination_dir: String,
    },
    /// Every hub-leg is now terminal: the request itself is terminal.
    /// The shell must emit the final status, hand off packaging for each
    /// successful hub, and delete the record. Carries the full removed
    /// record (not just its id) so the shell can still emit the terminal
    /// status even when the record was only ever synthetic — created and
    /// completed by the same message, with no prior snapshot to fall back
    /// on.
    RequestCompleted {
        record: RequestRecord,
        aggregate: Aggregate,
    },
}

/// Owns the map of active `RequestRecord`s. This is the single piece of
/// mutable state the serializer thread owns.
#[derive(Debug, Default)]
pub struct RequestMonitorState {
    records: BTreeMap<String, RequestRecord>,
    expire_after: Duration,
}

impl RequestMonitorState {
    pub fn new(expire_after: Duration) -> Self {
        RequestMonitorState {
            records: BTreeMap::new(),
            expire_after,
        }
    }

    /// Rehydrate from a durable store on restart.
    pub fn restore(records: BTreeMap<String, RequestRecord>, expire_after: Duration) -> Self {
        RequestMonitorState {
            records,
            expire_after,
        }
    }

    pub fn get(&self, request_id: &str) -> Option<&RequestRecord> {
        self.records.get(request_id)
    }

    /// Snapshot every active record. Callers that finalize many requests in
    /// one pass (the expiry sweep) need this taken *before* the pass, since
    /// finalized records are removed as part of it.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RequestRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply one report message, returning every [`Outcome`] it produces (in
    /// order: a leg transition can be immediately followed by request
    /// completion).
    pub fn apply(
        &mut self,
        msg: &ReportMessage,
        now: Instant,
    ) -> Result<Vec<Outcome>, TransitionError> {
        if msg.version < CURRENT_VERSION {
            return Err(TransitionError::StaleVersion {
                got: msg.version,
                current: CURRENT_VERSION,
            });
        }

        let mut outcomes = Vec::new();

        if msg.msgtype == MsgType::Initial {
            self.apply_initial(msg, now, &mut outcomes);
            return Ok(outcomes);
        }

        if msg.msgtype == MsgType::RequestError {
            // Rejected at admission, before any record ever existed. No
            // hub-leg lifecycle to touch — just the terminal notification.
            outcomes.push(Outcome::RequestRejected {
                request_id: msg.request_id.clone(),
                username: msg.username.clone(),
                prefix: msg.prefix.clone(),
                destination_dir: msg.destination_dir.clone(),
            });
            return Ok(outcomes);
        }

        let request_id = msg.request_id.clone();
        let Some(record) = self.records.get_mut(&request_id) else {
            // No active request for this id. A WORKING message is just
            // dropped with a warning; STARTED/DONE/FAILED still need their
            // hub-leg state recorded, so a synthetic record is created for
            // them instead.
            if msg.msgtype == MsgType::Working {
                outcomes.push(Outcome::Dropped {
                    detail: format!(
                        "WORKING for unknown request {request_id} (no active request)"
                    ),
                });
                return Ok(outcomes);
            }
            let mut record = new_synthetic_record(msg, now, self.expire_after);
            let to = leg_state_for_fresh_event(msg.msgtype);
            record.hub_legs.insert(
                msg.host.clone(),
                HubLeg {
                    host: msg.host.clone(),
                    state: to,
                    failure_reason: msg.reason.clone(),
                    synthetic: true,
                },
            );
            outcomes.push(Outcome::CreatedSynthetic {
                request_id: request_id.clone(),
                host: msg.host.clone(),
            });
            let first_in_progress = to != HubLegState::Initial;
            outcomes.push(Outcome::LegTransitioned {
                request_id: request_id.clone(),
                host: msg.host.clone(),
                to,
                first_in_progress,
            });
            let completed = record.all_legs_terminal();
            self.records.insert(request_id.clone(), record);
            if completed {
                self.finalize(&request_id, &mut outcomes);
            }
            return Ok(outcomes);
        };

        let existing_leg_state = record.hub_legs.get(&msg.host).map(|l| l.state);
        let (to, note) = next_leg_state(existing_leg_state, msg.msgtype);

        match note {
            LegNote::Ignore => {
                outcomes.push(Outcome::Dropped {
                    detail: format!("{} ignored for {}@{}", msg.msgtype, request_id, msg.host),
                });
                return Ok(outcomes);
            }
            LegNote::Duplicate => {
                outcomes.push(Outcome::Duplicate {
                    request_id: request_id.clone(),
                });
                return Ok(outcomes);
            }
            LegNote::LateAfterTerminal => {
                outcomes.push(Outcome::Late {
                    request_id: request_id.clone(),
                });
                return Ok(outcomes);
            }
            LegNote::Apply | LegNote::ApplyWarnDuplicateOrder => {}
        }

        let first_in_progress = !record.in_progress_notified && to != HubLegState::Initial;
        if first_in_progress {
            record.in_progress_notified = true;
        }

        let entry = record
            .hub_legs
            .entry(msg.host.clone())
            .or_insert_with(|| HubLeg::new(msg.host.clone()));
        entry.state = to;
        if msg.msgtype == MsgType::Failed {
            entry.failure_reason = msg.reason.clone();
        }

        outcomes.push(Outcome::LegTransitioned {
            request_id: request_id.clone(),
            host: msg.host.clone(),
            to,
            first_in_progress,
        });

        if record.all_legs_terminal() {
            self.finalize(&request_id, &mut outcomes);
        }

        Ok(outcomes)
    }

    fn apply_initial(&mut self, msg: &ReportMessage, now: Instant, outcomes: &mut Vec<Outcome>) {
        if self.records.contains_key(&msg.request_id) {
            // A duplicate INITIAL is always a no-op, regardless of how far
            // the request has already progressed.
            outcomes.push(Outcome::Duplicate {
                request_id: msg.request_id.clone(),
            });
            return;
        }

        let start_tick = Tick(msg.start_ticks.unwrap_or(0));
        let stop_tick = Tick(msg.stop_ticks.unwrap_or(0));
        let mut record = RequestRecord {
            request_id: msg.request_id.clone(),
            prefix: Prefix::from(msg.prefix.as_str()),
            username: msg.username.clone(),
            start_tick,
            stop_tick,
            destination_dir: msg.destination_dir.clone(),
            hub_legs: BTreeMap::new(),
            expiry_deadline: now + self.expire_after,
            created_at: now,
            in_progress_notified: false,
            email_sent: false,
        };
        if let Some(hubs) = &msg.hubs {
            for host in hubs {
                record.hub_legs.insert(host.clone(), HubLeg::new(host));
            }
        }
        self.records.insert(msg.request_id.clone(), record);
        outcomes.push(Outcome::Created {
            request_id: msg.request_id.clone(),
        });
    }

    /// Expiry sweep: any active leg still in
    /// `Initial`/`InProgress` on an expired record is forced to `Failed`
    /// with reason "timeout"; the request then takes the normal completion
    /// path.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<Outcome> {
        let expired_ids: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.is_expired(now) && !r.all_legs_terminal())
            .map(|(id, _)| id.clone())
            .collect();

        let mut outcomes = Vec::new();
        for request_id in expired_ids {
            let record = self.records.get_mut(&request_id).expect("just looked up");
            for leg in record.hub_legs.values_mut() {
                if !leg.state.is_terminal() {
                    leg.state = HubLegState::Failed;
                    leg.failure_reason = Some("timeout".to_owned());
                    outcomes.push(Outcome::LegTransitioned {
                        request_id: request_id.clone(),
                        host: leg.host.clone(),
                        to: HubLegState::Failed,
                        first_in_progress: false,
                    });
                }
            }
            if record.hub_legs.is_empty() {
                // A request with no hub-legs at all (e.g. INITIAL arrived
                // with an empty/absent hubs list and no worker ever
                // reported) still must terminate on expiry.
                let record = self.records.remove(&request_id).expect("just looked up");
                outcomes.push(Outcome::RequestCompleted {
                    record,
                    aggregate: Aggregate::default(),
                });
                continue;
            }
            self.finalize(&request_id, &mut outcomes);
        }
        outcomes
    }

    fn finalize(&mut self, request_id: &str, outcomes: &mut Vec<Outcome>) {
        if let Some(record) = self.records.remove(request_id) {
            let aggregate = record.aggregate();
            outcomes.push(Outcome::RequestCompleted { record, aggregate });
        }
    }
}

fn new_synthetic_record(msg: &ReportMessage, now: Instant, expire_after: Duration) -> RequestRecord {
    RequestRecord {
        request_id: msg.request_id.clone(),
        prefix: Prefix::from(msg.prefix.as_str()),
        username: msg.username.clone(),
        start_tick: Tick(msg.start_ticks.unwrap_or(0)),
        stop_tick: Tick(msg.stop_ticks.unwrap_or(0)),
        destination_dir: msg.destination_dir.clone(),
        hub_legs: BTreeMap::new(),
        expiry_deadline: now + expire_after,
        created_at: now,
        in_progress_notified: false,
        // A synthetic record created from a late STARTED/DONE/FAILED never
        // gets its own e-mail; marking it sent up front keeps the shell
        // from ever firing one for this record.
        email_sent: true,
    }
}

/// The leg state a brand-new leg lands in when the very first message it
/// ever sees is STARTED/DONE/FAILED, i.e. the leg had no prior `INITIAL`.
fn leg_state_for_fresh_event(msgtype: MsgType) -> HubLegState {
    match msgtype {
        MsgType::Started => HubLegState::InProgress,
        MsgType::Done => HubLegState::Done,
        MsgType::Failed => HubLegState::Failed,
        MsgType::Initial | MsgType::Working | MsgType::RequestError => {
            unreachable!("handled by caller")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegNote {
    Apply,
    /// Applied, but the transition table calls for a WARN log because it's
    /// a duplicate or out-of-order arrival that still needs a state change.
    ApplyWarnDuplicateOrder,
    Duplicate,
    Ignore,
    LateAfterTerminal,
}

/// The hub-leg state transition table, scoped to a single hub-leg. `current`
/// is `None` when the leg has never been seen within an existing
/// `RequestRecord` (e.g. a host outside the `hubs` list the `INITIAL`
/// message enumerated).
fn next_leg_state(current: Option<HubLegState>, event: MsgType) -> (HubLegState, LegNote) {
    use HubLegState::*;
    use MsgType as M;

    match (current, event) {
        // Terminal legs: every further message is a dup/late no-op.
        (Some(Done | Failed), M::Started) => (current.unwrap(), LegNote::LateAfterTerminal),
        (Some(Done | Failed), M::Working) => (current.unwrap(), LegNote::Ignore),
        (Some(Done), M::Done) => (Done, LegNote::Duplicate),
        (Some(Failed), M::Failed) => (Failed, LegNote::Duplicate),
        (Some(Done), M::Failed) | (Some(Failed), M::Done) => (current.unwrap(), LegNote::Duplicate),

        // IN_PROGRESS row.
        (Some(InProgress), M::Started) => (InProgress, LegNote::Duplicate),
        (Some(InProgress), M::Working) => (InProgress, LegNote::Apply),
        (Some(InProgress), M::Done) => (Done, LegNote::Apply),
        (Some(InProgress), M::Failed) => (Failed, LegNote::Apply),

        // INITIAL row: leg pre-populated from the request's hubs list but
        // no worker message has arrived yet.
        (Some(Initial) | None, M::Started) => (InProgress, LegNote::Apply),
        (Some(Initial) | None, M::Working) => (InProgress, LegNote::Apply),
        // DONE/FAILED with no prior STARTED: accepted, collapses the
        // intermediate transition.
        (Some(Initial) | None, M::Done) => (Done, LegNote::ApplyWarnDuplicateOrder),
        (Some(Initial) | None, M::Failed) => (Failed, LegNote::ApplyWarnDuplicateOrder),

        (_, M::Initial) => unreachable!("INITIAL handled by apply_initial"),
        (_, M::RequestError) => unreachable!("REQUEST_ERROR handled by apply"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsiface_protocol::ReportMessage;

    fn initial_msg(request_id: &str, hubs: &[&str]) -> ReportMessage {
        ReportMessage {
            msgtype: MsgType::Initial,
            request_id: request_id.to_owned(),
            username: "u".into(),
            prefix: "SNALERT".into(),
            start_ticks: Some(100),
            stop_ticks: Some(200),
            copy_dir: None,
            destination_dir: "/dest".into(),
            extract: false,
            host: String::new(),
            hubs: Some(hubs.iter().map(|s| s.to_string()).collect()),
            version: CURRENT_VERSION,
            reason: None,
        }
    }

    fn leg_msg(request_id: &str, host: &str, msgtype: MsgType) -> ReportMessage {
        ReportMessage {
            msgtype,
            request_id: request_id.to_owned(),
            username: "u".into(),
            prefix: "SNALERT".into(),
            start_ticks: if msgtype == MsgType::Working {
                None
            } else {
                Some(100)
            },
            stop_ticks: if msgtype == MsgType::Working {
                None
            } else {
                Some(200)
            },
            copy_dir: None,
            destination_dir: "/dest".into(),
            extract: false,
            host: host.to_owned(),
            hubs: None,
            version: CURRENT_VERSION,
            reason: None,
        }
    }

    #[test]
    fn happy_path_two_hubs_reaches_success() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let now = Instant::now();

        let out = state
            .apply(&initial_msg("r1", &["ichub01", "ichub66"]), now)
            .unwrap();
        assert_eq!(out, vec![Outcome::Created { request_id: "r1".into() }]);

        for host in ["ichub01", "ichub66"] {
            state
                .apply(&leg_msg("r1", host, MsgType::Started), now)
                .unwrap();
        }

        let out_done1 = state
            .apply(&leg_msg("r1", "ichub01", MsgType::Done), now)
            .unwrap();
        assert_eq!(out_done1.len(), 1);
        assert!(matches!(out_done1[0], Outcome::LegTransitioned { .. }));

        let out_done2 = state
            .apply(&leg_msg("r1", "ichub66", MsgType::Done), now)
            .unwrap();
        assert_eq!(out_done2.len(), 2);
        match &out_done2[1] {
            Outcome::RequestCompleted { record, aggregate } => {
                assert_eq!(record.request_id, "r1");
                assert_eq!(aggregate.success, vec!["ichub01", "ichub66"]);
                assert!(aggregate.failed.is_empty());
            }
            other => panic!("expected RequestCompleted, got {other:?}"),
        }
        assert!(state.is_empty());
    }

    #[test]
    fn done_before_started_collapses_intermediate_transition() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let now = Instant::now();
        state.apply(&initial_msg("r2", &["ichub01"]), now).unwrap();

        let out = state
            .apply(&leg_msg("r2", "ichub01", MsgType::Done), now)
            .unwrap();
        assert!(matches!(out[0], Outcome::LegTransitioned { to: HubLegState::Done, .. }));
        match &out[1] {
            Outcome::RequestCompleted { aggregate, .. } => {
                assert_eq!(aggregate.success, vec!["ichub01"]);
            }
            other => panic!("expected RequestCompleted, got {other:?}"),
        }
    }

    #[test]
    fn missing_initial_creates_synthetic_record() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let now = Instant::now();

        let out = state
            .apply(&leg_msg("orphan", "ichub01", MsgType::Started), now)
            .unwrap();
        assert!(matches!(out[0], Outcome::CreatedSynthetic { .. }));
        assert!(matches!(
            out[1],
            Outcome::LegTransitioned { to: HubLegState::InProgress, .. }
        ));

        let record = state.get("orphan").expect("synthetic record exists");
        assert!(record.email_sent, "no e-mail should be sent for synthetic records");

        let out2 = state
            .apply(&leg_msg("orphan", "ichub01", MsgType::Done), now)
            .unwrap();
        match &out2[1] {
            Outcome::RequestCompleted { aggregate, .. } => {
                assert_eq!(aggregate.success, vec!["ichub01"]);
            }
            other => panic!("expected RequestCompleted, got {other:?}"),
        }
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let mut msg = initial_msg("r3", &["ichub01"]);
        msg.version = 0;
        let err = state.apply(&msg, Instant::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::StaleVersion {
                got: 0,
                current: CURRENT_VERSION
            }
        );
        assert!(state.get("r3").is_none());
    }

    #[test]
    fn expiry_forces_outstanding_legs_to_failed_and_completes() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let now = Instant::now();
        state
            .apply(&initial_msg("r5", &["ichub01", "ichub66"]), now)
            .unwrap();
        state
            .apply(&leg_msg("r5", "ichub01", MsgType::Done), now)
            .unwrap();

        let later = now + Duration::from_secs(16);
        let outcomes = state.sweep_expired(later);
        let completed = outcomes
            .iter()
            .find_map(|o| match o {
                Outcome::RequestCompleted { aggregate, .. } => Some(aggregate.clone()),
                _ => None,
            })
            .expect("request should complete on expiry");
        assert_eq!(completed.success, vec!["ichub01"]);
        assert_eq!(completed.failed, vec!["ichub66"]);
        assert!(state.is_empty());
    }

    #[test]
    fn duplicate_done_after_success_is_a_no_op() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let now = Instant::now();
        state.apply(&initial_msg("r6", &["ichub01"]), now).unwrap();
        state
            .apply(&leg_msg("r6", "ichub01", MsgType::Done), now)
            .unwrap();
        assert!(state.is_empty());

        let out = state
            .apply(&leg_msg("r6", "ichub01", MsgType::Done), now)
            .unwrap();
        assert_eq!(out, vec![Outcome::Late { request_id: "r6".into() }]);
    }

    #[test]
    fn duplicate_initial_is_a_no_op() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let now = Instant::now();
        state.apply(&initial_msg("r7", &["ichub01"]), now).unwrap();
        let out = state.apply(&initial_msg("r7", &["ichub01"]), now).unwrap();
        assert_eq!(out, vec![Outcome::Duplicate { request_id: "r7".into() }]);
    }

    #[test]
    fn working_for_unknown_request_is_dropped_without_creating_anything() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let out = state
            .apply(&leg_msg("ghost", "ichub01", MsgType::Working), Instant::now())
            .unwrap();
        assert!(matches!(out[0], Outcome::Dropped { .. }));
        assert!(state.get("ghost").is_none());
    }

    #[test]
    fn request_error_rejects_without_touching_state() {
        let mut state = RequestMonitorState::new(Duration::from_secs(15));
        let msg = ReportMessage {
            msgtype: MsgType::RequestError,
            request_id: "r8".into(),
            username: "u".into(),
            prefix: "SNALERT".into(),
            start_ticks: None,
            stop_ticks: None,
            copy_dir: None,
            destination_dir: "/dest".into(),
            extract: false,
            host: String::new(),
            hubs: None,
            version: CURRENT_VERSION,
            reason: None,
        };
        let out = state.apply(&msg, Instant::now()).unwrap();
        assert_eq!(
            out,
            vec![Outcome::RequestRejected {
                request_id: "r8".into(),
                username: "u".into(),
                prefix: "SNALERT".into(),
                destination_dir: "/dest".into(),
            }]
        );
        assert!(state.get("r8").is_none());
        assert!(state.is_empty());
    }
}
