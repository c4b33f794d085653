// crates/vigil-app/src/alert.rs
//
// Outbound HTTP alert on a fired warning window. Delivery is best-effort:
// a failed POST is logged and forgotten, and the request timeout is well
// under one debouncer window so the ticker thread is never starved.

use std::time::Duration;

use chrono::{Local, TimeZone};
use serde::Serialize;
use uuid::Uuid;

use vigil_core::config;

#[derive(Serialize)]
struct AlertPayload<'a> {
    #[serde(rename = "type")]
    kind:        &'a str,
    ts:          String,
    device_uuid: &'a str,
}

pub struct Alerter {
    url:         Option<&'static str>,
    device_uuid: String,
    agent:       ureq::Agent,
}

impl Alerter {
    pub fn new() -> Self {
        let device_uuid = config::DEVICE_UUID
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(3))
            .build();
        Self { url: config::ALERT_URL, device_uuid, agent }
    }

    /// POST one alert for `label` observed at unix-seconds `timestamp`.
    pub fn emit(&self, label: &str, timestamp: i64) {
        let Some(url) = self.url else { return };
        let payload = AlertPayload {
            kind:        label,
            ts:          format_ts(timestamp),
            device_uuid: &self.device_uuid,
        };
        match self.agent.post(url).send_json(&payload) {
            Ok(response) => log::debug!("alert delivered: HTTP {}", response.status()),
            Err(e) => log::warn!("alert POST to {url} failed: {e}"),
        }
    }
}

fn format_ts(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape_matches_the_receiver() {
        let payload = AlertPayload {
            kind:        "person",
            ts:          "2026-08-01 13:05:09".into(),
            device_uuid: "1234567890abcdef",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "person");
        assert_eq!(json["ts"], "2026-08-01 13:05:09");
        assert_eq!(json["device_uuid"], "1234567890abcdef");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn timestamp_formats_as_datetime() {
        let ts = format_ts(1_700_000_000);
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[13..14], ":");
    }
}
