use serde::{Deserialize, Serialize};

/// Aggregate status of a request, as it appears in the `status` field of the
/// notification JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "IN PROGRESS")]
    InProgress,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "REQUEST ERROR")]
    RequestError,
}

/// The `value` object inside a status notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusValue {
    pub request_id: String,
    pub username: String,
    pub prefix: String,
    pub start_time: String,
    pub stop_time: String,
    pub destination_dir: String,
    pub update_time: String,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
}

/// Full envelope emitted to the notification sink (I3Live-equivalent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub service: String,
    pub varname: String,
    pub prio: u8,
    pub time: String,
    pub value: StatusValue,
}

impl StatusNotification {
    pub fn new(time: String, value: StatusValue) -> Self {
        StatusNotification {
            service: "hitspool".to_owned(),
            varname: "hsrequest_info".to_owned(),
            prio: 1,
            time,
            value,
        }
    }
}

/// One-shot operator e-mail payload, sent on the first admitted message for a
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEmail {
    pub service: String,
    pub varname: String,
    pub prio: u8,
    pub time: String,
    pub value: NotificationEmailValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEmailValue {
    pub condition: String,
    pub desc: String,
    pub notifies: Vec<EmailTarget>,
    pub short_subject: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTarget {
    pub receiver: String,
    pub notifies_txt: String,
    pub notifies_header: String,
}

impl NotificationEmail {
    pub fn new(time: String, header: String, message: String, addresses: &[String]) -> Self {
        let notifies = addresses
            .iter()
            .map(|addr| EmailTarget {
                receiver: addr.clone(),
                notifies_txt: message.clone(),
                notifies_header: header.clone(),
            })
            .collect();
        NotificationEmail {
            service: "HSiface".to_owned(),
            varname: "alert".to_owned(),
            prio: 2,
            time,
            value: NotificationEmailValue {
                condition: header,
                desc: "HsInterface Data Request".to_owned(),
                notifies,
                short_subject: true,
                quiet: true,
            },
        }
    }
}
