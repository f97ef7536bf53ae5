//! Validation and canonicalization of inbound Alert requests.

use hsiface_protocol::{AlertError, AlertRequest, FanoutMessage, ReportMessage, CURRENT_VERSION};

/// Everything the Publisher must emit for one admitted request: the
/// INITIAL message for the Report channel, and the canonicalized request
/// for the Fan-out channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Admitted {
    pub request_id: String,
    pub initial: ReportMessage,
    pub fanout: FanoutMessage,
}

/// Validate and canonicalize one [`AlertRequest`].
/// `known_hubs` backs the "hubs is a list of known hub identifiers" check.
/// `next_request_id` is called only when the client omitted one — callers
/// pass a UUID generator in production and a deterministic stub in tests.
pub fn admit(
    req: AlertRequest,
    known_hubs: &[String],
    default_prefix: &str,
    next_request_id: impl FnOnce() -> String,
) -> Result<Admitted, AlertError> {
    if req.username.is_empty() {
        return Err(AlertError::MissingField("username"));
    }
    if req.copy.is_empty() {
        return Err(AlertError::MissingField("copy"));
    }
    if req.start > req.stop {
        return Err(AlertError::StartAfterStop);
    }

    let hubs = match req.hubs {
        None => None,
        Some(serde_json::Value::Array(items)) => {
            let mut hosts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_json::Value::String(s) => hosts.push(s),
                    other => {
                        return Err(AlertError::BadHubsShape(other.to_string()));
                    }
                }
            }
            for host in &hosts {
                if !known_hubs.iter().any(|k| k == host) {
                    return Err(AlertError::UnknownHub(host.clone()));
                }
            }
            Some(hosts)
        }
        Some(other) => return Err(AlertError::BadHubsShape(other.to_string())),
    };

    let request_id = req.request_id.unwrap_or_else(next_request_id);
    let prefix = req.prefix.unwrap_or_else(|| default_prefix.to_owned());
    let start_ticks = req.start * 10;
    let stop_ticks = req.stop * 10;

    let initial = ReportMessage {
        msgtype: hsiface_protocol::MsgType::Initial,
        request_id: request_id.clone(),
        username: req.username.clone(),
        prefix: prefix.clone(),
        start_ticks: Some(start_ticks),
        stop_ticks: Some(stop_ticks),
        copy_dir: None,
        destination_dir: req.copy.clone(),
        extract: false,
        host: String::new(),
        hubs: hubs.clone(),
        version: CURRENT_VERSION,
        reason: None,
    };

    let fanout = FanoutMessage {
        request_id: request_id.clone(),
        username: req.username,
        prefix,
        start_ticks,
        stop_ticks,
        destination_dir: req.copy,
        hubs,
        version: CURRENT_VERSION,
    };

    Ok(Admitted {
        request_id,
        initial,
        fanout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["ichub01".into(), "ichub66".into()]
    }

    fn request() -> AlertRequest {
        AlertRequest {
            start: 0,
            stop: 10,
            copy: "/dest".into(),
            request_id: Some("r1".into()),
            username: "u".into(),
            prefix: None,
            hubs: None,
        }
    }

    #[test]
    fn admits_a_valid_request_and_scales_ticks() {
        let admitted = admit(request(), &known(), "ANON", || unreachable!()).unwrap();
        assert_eq!(admitted.request_id, "r1");
        assert_eq!(admitted.initial.start_ticks, Some(0));
        assert_eq!(admitted.initial.stop_ticks, Some(100));
        assert_eq!(admitted.fanout.prefix, "ANON");
    }

    #[test]
    fn generates_a_request_id_when_missing() {
        let mut req = request();
        req.request_id = None;
        let admitted = admit(req, &known(), "ANON", || "generated-1".to_owned()).unwrap();
        assert_eq!(admitted.request_id, "generated-1");
    }

    #[test]
    fn rejects_start_after_stop() {
        let mut req = request();
        req.start = 100;
        req.stop = 0;
        let err = admit(req, &known(), "ANON", || unreachable!()).unwrap_err();
        assert_eq!(err, AlertError::StartAfterStop);
    }

    #[test]
    fn rejects_unknown_hub() {
        let mut req = request();
        req.hubs = Some(serde_json::json!(["ichub01", "ichub99"]));
        let err = admit(req, &known(), "ANON", || unreachable!()).unwrap_err();
        assert_eq!(err, AlertError::UnknownHub("ichub99".into()));
    }

    #[test]
    fn rejects_non_array_hubs_shape() {
        let mut req = request();
        req.hubs = Some(serde_json::json!("ichub01"));
        let err = admit(req, &known(), "ANON", || unreachable!()).unwrap_err();
        assert!(matches!(err, AlertError::BadHubsShape(_)));
    }

    #[test]
    fn admits_an_explicit_hub_subset() {
        let mut req = request();
        req.hubs = Some(serde_json::json!(["ichub01"]));
        let admitted = admit(req, &known(), "ANON", || unreachable!()).unwrap();
        assert_eq!(admitted.fanout.hubs, Some(vec!["ichub01".to_owned()]));
    }
}
