//! Notification sink: status JSON + one-shot operator e-mail.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use hsiface_core::request::{Aggregate, RequestRecord};
use hsiface_core::tick::{DaqTime, Tick};
use hsiface_protocol::{
    EmailTarget, NotificationEmail, NotificationEmailValue, RequestStatus, StatusNotification,
    StatusValue,
};
use tracing::error;

/// Where status JSON and e-mail payloads go. The real I3Live-equivalent
/// sink is site-specific; this crate only needs an append-only line
/// destination, matching the journal's own append-and-fsync discipline.
pub trait NotificationSink: Send + Sync {
    fn send_status(&self, notification: &StatusNotification);
    fn send_email(&self, email: &NotificationEmail);
}

pub struct JsonlNotificationSink {
    path: PathBuf,
}

impl JsonlNotificationSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlNotificationSink { path: path.into() }
    }
}

impl NotificationSink for JsonlNotificationSink {
    fn send_status(&self, notification: &StatusNotification) {
        append_line(&self.path, notification);
    }

    fn send_email(&self, email: &NotificationEmail) {
        append_line(&self.path, email);
    }
}

fn append_line<T: serde::Serialize>(path: &Path, value: &T) {
    let line = match serde_json::to_string(value) {
        Ok(line) => line,
        Err(e) => {
            error!(error = %e, "failed to serialize notification payload");
            return;
        }
    };
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{line}"));
    if let Err(e) = result {
        error!(path = %path.display(), error = %e, "failed to write notification sink");
    }
}

fn daq_time(tick_anchor_year: i32, tick: Tick) -> String {
    DaqTime::new(tick_anchor_year, tick).to_utc_string()
}

/// Strip a hub hostname (e.g. `ichub01`) down to its tail number (`1`), as
/// used in the `success`/`failed` CSV fields.
fn hub_tail_number(host: &str) -> String {
    let digits: String = host.chars().skip_while(|c| !c.is_ascii_digit()).collect();
    match digits.parse::<u64>() {
        Ok(n) => n.to_string(),
        Err(_) => digits,
    }
}

fn join_tail_numbers(hosts: &[String]) -> String {
    hosts.iter().map(|h| hub_tail_number(h)).collect::<Vec<_>>().join(",")
}

fn base_value(record: &RequestRecord, tick_anchor_year: i32, update_time: &str, status: RequestStatus) -> StatusValue {
    StatusValue {
        request_id: record.request_id.clone(),
        username: record.username.clone(),
        prefix: record.prefix.as_str().to_owned(),
        start_time: daq_time(tick_anchor_year, record.start_tick),
        stop_time: daq_time(tick_anchor_year, record.stop_tick),
        destination_dir: record.destination_dir.clone(),
        update_time: update_time.to_owned(),
        status,
        success: None,
        failed: None,
    }
}

pub fn queued_status(record: &RequestRecord, tick_anchor_year: i32, now: &str) -> StatusNotification {
    StatusNotification::new(
        now.to_owned(),
        base_value(record, tick_anchor_year, now, RequestStatus::Queued),
    )
}

pub fn in_progress_status(record: &RequestRecord, tick_anchor_year: i32, now: &str) -> StatusNotification {
    StatusNotification::new(
        now.to_owned(),
        base_value(record, tick_anchor_year, now, RequestStatus::InProgress),
    )
}

/// Terminal status: SUCCESS/FAIL/PARTIAL depending on
/// the aggregate split, or REQUEST ERROR for admission-time rejections.
pub fn terminal_status(
    record: &RequestRecord,
    aggregate: &Aggregate,
    tick_anchor_year: i32,
    now: &str,
) -> StatusNotification {
    let status = if aggregate.is_all_success() {
        RequestStatus::Success
    } else if aggregate.is_all_failed() {
        RequestStatus::Fail
    } else {
        RequestStatus::Partial
    };
    let mut value = base_value(record, tick_anchor_year, now, status);
    if !aggregate.success.is_empty() {
        value.success = Some(join_tail_numbers(&aggregate.success));
    }
    if !aggregate.failed.is_empty() {
        value.failed = Some(join_tail_numbers(&aggregate.failed));
    }
    StatusNotification::new(now.to_owned(), value)
}

pub fn request_error_status(
    request_id: &str,
    username: &str,
    prefix: &str,
    destination_dir: &str,
    now: &str,
) -> StatusNotification {
    StatusNotification::new(
        now.to_owned(),
        StatusValue {
            request_id: request_id.to_owned(),
            username: username.to_owned(),
            prefix: prefix.to_owned(),
            start_time: String::new(),
            stop_time: String::new(),
            destination_dir: destination_dir.to_owned(),
            update_time: now.to_owned(),
            status: RequestStatus::RequestError,
            success: None,
            failed: None,
        },
    )
}

/// One-shot operator e-mail: SN-alert recipients are
/// only notified when the request's prefix is SNALERT.
pub fn request_email(record: &RequestRecord, cluster_name: &str, dev: &[String], sn: &[String], now: &str) -> NotificationEmail {
    let mut addresses = dev.to_vec();
    if record.prefix.is_sn_alert() {
        addresses.extend(sn.iter().cloned());
    }
    let header = format!("{cluster_name}: HitSpool request {}", record.request_id);
    let message = format!(
        "HitSpool data request {} from {} for {} (prefix {})",
        record.request_id,
        record.username,
        record.destination_dir,
        record.prefix.as_str()
    );
    NotificationEmail::new(now.to_owned(), header, message, &addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsiface_test_utils::sample_record;
    use std::time::Instant;

    #[test]
    fn tail_numbers_strip_leading_zeros() {
        assert_eq!(hub_tail_number("ichub01"), "1");
        assert_eq!(hub_tail_number("ichub66"), "66");
    }

    #[test]
    fn terminal_status_all_success_has_no_failed_field() {
        let record = sample_record("r1", Instant::now());
        let aggregate = Aggregate {
            success: vec!["ichub01".into(), "ichub66".into()],
            failed: vec![],
        };
        let status = terminal_status(&record, &aggregate, 2026, "2026-07-31 00:00:00");
        assert_eq!(status.value.success.as_deref(), Some("1,66"));
        assert_eq!(status.value.failed, None);
        assert_eq!(status.value.status, RequestStatus::Success);
    }

    #[test]
    fn terminal_status_mixed_is_partial() {
        let record = sample_record("r1", Instant::now());
        let aggregate = Aggregate {
            success: vec!["ichub01".into()],
            failed: vec!["ichub66".into()],
        };
        let status = terminal_status(&record, &aggregate, 2026, "2026-07-31 00:00:00");
        assert_eq!(status.value.status, RequestStatus::Partial);
        assert_eq!(status.value.success.as_deref(), Some("1"));
        assert_eq!(status.value.failed.as_deref(), Some("66"));
    }

    #[test]
    fn sn_alert_recipients_only_notified_for_sn_alert_prefix() {
        let mut record = sample_record("r1", Instant::now());
        record.prefix = hsiface_core::Prefix::Anon;
        let email = request_email(
            &record,
            "icecube",
            &["dev@example.org".to_owned()],
            &["sn@example.org".to_owned()],
            "2026-07-31 00:00:00",
        );
        assert_eq!(email.value.notifies.len(), 1);
        assert_eq!(email.value.notifies[0].receiver, "dev@example.org");
    }
}
