use std::time::{Duration, Instant};

use hsiface_core::{HubLeg, Prefix, RequestRecord, Tick};

/// A `RequestRecord` with two hub-legs (`ichub01`, `ichub66`), both
/// `InProgress`, expiring 15s from `now`.
pub fn sample_record(request_id: &str, now: Instant) -> RequestRecord {
    let mut hub_legs = std::collections::BTreeMap::new();
    for host in ["ichub01", "ichub66"] {
        hub_legs.insert(host.to_owned(), HubLeg::new(host));
    }
    RequestRecord {
        request_id: request_id.to_owned(),
        prefix: Prefix::SnAlert,
        username: "testuser".to_owned(),
        start_tick: Tick(100),
        stop_tick: Tick(200),
        destination_dir: "/dest".to_owned(),
        hub_legs,
        expiry_deadline: now + Duration::from_secs(15),
        created_at: now,
        in_progress_notified: false,
        email_sent: false,
    }
}
