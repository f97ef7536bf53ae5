use hsiface_protocol::{MsgType, ReportMessage, CURRENT_VERSION};

fn base(msgtype: MsgType, request_id: &str, host: &str) -> ReportMessage {
    ReportMessage {
        msgtype,
        request_id: request_id.to_owned(),
        username: "testuser".to_owned(),
        prefix: "SNALERT".to_owned(),
        start_ticks: Some(100),
        stop_ticks: Some(200),
        copy_dir: None,
        destination_dir: "/dest".to_owned(),
        extract: false,
        host: host.to_owned(),
        hubs: None,
        version: CURRENT_VERSION,
        reason: None,
    }
}

pub fn initial_message(request_id: &str, hubs: &[&str]) -> ReportMessage {
    let mut msg = base(MsgType::Initial, request_id, "");
    msg.hubs = Some(hubs.iter().map(|s| s.to_string()).collect());
    msg
}

pub fn started_message(request_id: &str, host: &str) -> ReportMessage {
    base(MsgType::Started, request_id, host)
}

pub fn working_message(request_id: &str, host: &str) -> ReportMessage {
    let mut msg = base(MsgType::Working, request_id, host);
    msg.start_ticks = None;
    msg.stop_ticks = None;
    msg
}

pub fn done_message(request_id: &str, host: &str, copy_dir: &str) -> ReportMessage {
    let mut msg = base(MsgType::Done, request_id, host);
    msg.copy_dir = Some(copy_dir.to_owned());
    msg
}

pub fn failed_message(request_id: &str, host: &str, reason: &str) -> ReportMessage {
    let mut msg = base(MsgType::Failed, request_id, host);
    msg.reason = Some(reason.to_owned());
    msg
}
