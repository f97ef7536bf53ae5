//! Domain model and pure state-machine logic for the HitSpool request
//! lifecycle coordinator. Nothing in this crate touches a socket, a clock
//! source, or a filesystem directly — that keeps the hard part (the
//! `RequestMonitor` transition table) testable without any I/O, separated
//! from the transport/storage code that moves records around.

pub mod prefix;
pub mod request;
pub mod tick;
pub mod transition;

pub use prefix::Prefix;
pub use request::{HubLeg, Request, RequestRecord};
pub use tick::Tick;
pub use transition::{Outcome, RequestMonitorState, TransitionError};
