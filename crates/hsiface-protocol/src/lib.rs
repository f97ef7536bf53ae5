//! Wire types for the HitSpool request lifecycle protocol.
//!
//! All three channel shapes (Alert, Fan-out, Report) carry JSON objects
//! shaped by the types in this crate. Serialization is one-to-one with the
//! schemas in the hitspool interface's external-interfaces section: the
//! `msgtype` field on [`ReportMessage`] is a serde external tag, the same
//! way a wire message enum tags itself on a `kind` field.

mod alert;
mod fanout;
mod report;
mod status;

pub use alert::{AlertError, AlertErrorBody, AlertReply, AlertRequest};
pub use fanout::FanoutMessage;
pub use report::{HubLegState, MsgType, ReportMessage, SchemaViolation};
pub use status::{
    EmailTarget, NotificationEmail, NotificationEmailValue, RequestStatus, StatusNotification,
    StatusValue,
};

/// Current protocol version. Inbound report messages with `version < CURRENT_VERSION`
/// are rejected at admission.
pub const CURRENT_VERSION: u32 = 1;

/// DAQ ticks per second: 1 tick = 0.1 ns = 1e-10 s.
pub const TICKS_PER_SECOND: i64 = 10_000_000_000;

/// Literal reply bytes the Publisher sends on successful admission.
pub const ALERT_DONE_REPLY: &[u8] = b"DONE\0";
