//! The WebSocket wire protocol: a textual event name plus a JSON payload
//! object, exchanged over one socket per actor (one per runner, one per
//! app). See the specification's external-interfaces section for the full
//! event table — this module is that table expressed as Rust types.

use serde::{Deserialize, Serialize};

/// Every frame on the wire is `{"event": "<name>", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            event: event.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"event":"error","payload":{"code":"INTERNAL","message":"failed to encode frame"}}"#
                .to_string()
        })
    }

    /// Parse `payload` into `T`, mapping decode failures to `None` so callers
    /// can respond with `INVALID_FORMAT` rather than panicking on malformed
    /// client input.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

// ── Event names ──────────────────────────────────────────────────────────

pub mod events {
    pub const APP_AUTH: &str = "app:auth";
    pub const APP_AUTHENTICATED: &str = "app:authenticated";
    pub const APP_PAIR: &str = "app:pair";
    pub const PAIRING_SUCCESS: &str = "pairing:success";
    pub const PAIRING_ERROR: &str = "pairing:error";
    pub const APP_PAIRING_STATUS: &str = "app:pairing:status";
    pub const PAIRING_STATUS: &str = "pairing:status";
    pub const APP_UNPAIR: &str = "app:unpair";
    pub const PAIRING_UNPAIRED: &str = "pairing:unpaired";
    pub const RUNNER_ONLINE: &str = "runner:online";
    pub const RUNNER_OFFLINE: &str = "runner:offline";
    pub const RUNNER_REGISTER: &str = "runner:register";
    pub const RUNNER_REGISTERED: &str = "runner:registered";
    pub const RUNNER_HEARTBEAT: &str = "runner:heartbeat";
    pub const RUNNER_HEARTBEAT_ACK: &str = "runner:heartbeat:ack";
    pub const CONNECT_RUNNER: &str = "connect_runner";
    pub const CREATE_SESSION: &str = "create_session";
    pub const SESSION_CREATED: &str = "session_created";
    pub const TERMINAL_INPUT: &str = "terminal_input";
    pub const TERMINAL_RESIZE: &str = "terminal_resize";
    pub const TERMINAL_OUTPUT: &str = "terminal_output";
    pub const SESSION_ENDED: &str = "session_ended";
    pub const SESSION_RESUME: &str = "session_resume";
    pub const SESSION_RESUMED: &str = "session_resumed";
    pub const ERROR: &str = "error";
}

// ── Payloads: app -> broker ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAuthPayload {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPairPayload {
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRunnerPayload {
    pub runner_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumePayload {
    pub session_id: String,
}

// ── Payloads: runner -> broker ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerRegisterPayload {
    pub runner_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerHeartbeatPayload {
    pub runner_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedPayload {
    pub session_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

// ── Payloads: shared by both directions (terminal I/O) ────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalInputPayload {
    pub session_id: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResizePayload {
    pub session_id: String,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputPayload {
    pub session_id: String,
    pub data: String,
}

// ── Payloads: broker -> app ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAuthenticatedPayload {
    pub user_id: String,
    pub runners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingSuccessPayload {
    pub runner_id: String,
    pub paired_at: i64,
    pub runner_online: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ban_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingStatusPayload {
    pub is_paired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_online: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStatusPayload {
    pub runner_id: String,
}

// ── Payloads: broker -> runner ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerRegisteredPayload {
    pub runner_id: String,
    pub pairing_code: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionPayload {
    pub session_id: String,
}

// ── Payloads: broker -> app (session) ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreatedPayload {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumedPayload {
    pub session_id: String,
    pub active: bool,
}

// ── Shared error frame (broker -> either actor) ────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let env = Envelope::new(events::APP_PAIR, AppPairPayload { code: "ABC-123-XYZ".into() });
        let text = env.to_text();
        let parsed: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.event, events::APP_PAIR);
        let decoded: AppPairPayload = parsed.decode().unwrap();
        assert_eq!(decoded.code, "ABC-123-XYZ");
    }

    #[test]
    fn malformed_payload_decodes_to_none() {
        let env = Envelope {
            event: events::APP_PAIR.into(),
            payload: serde_json::json!({"wrong_field": 1}),
        };
        let decoded: Option<AppPairPayload> = env.decode();
        assert!(decoded.is_none());
    }
}
