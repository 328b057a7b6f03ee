//! JSON lines printed by the CLI.

use std::fmt::Write;
use std::time::Duration;

use freelance_client::{Reply, ServerHealthState};
use serde::Serialize;

/// Outcome of one `request` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestReport {
    pub server: String,
    pub key: String,
    /// Payload as lowercase hex
    pub payload: String,
    pub elapsed_ms: u64,
}

impl RequestReport {
    pub fn new(reply: &Reply, elapsed: Duration) -> Self {
        Self {
            server: reply.server.clone(),
            key: reply.key.clone(),
            payload: to_hex(&reply.payload),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Liveness line printed by `watch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub endpoint: String,
    pub alive: bool,
}

impl From<&ServerHealthState> for ServerStatus {
    fn from(state: &ServerHealthState) -> Self {
        Self {
            endpoint: state.endpoint().to_string(),
            alive: state.is_alive(),
        }
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use freelance_client::HealthSettings;
    use freelance_common::ManualClock;

    use super::*;

    #[test]
    fn test_hex_encoding() {
        assert_eq!(to_hex(&[]), "");
        assert_eq!(to_hex(&[0x00, 0x0f, 0xab, 0xff]), "000fabff");
    }

    #[test]
    fn test_request_report_json() {
        let reply = Reply {
            server: "server-1".to_string(),
            key: "k".to_string(),
            payload: vec![1, 2, 3, 4],
        };
        let report = RequestReport::new(&reply, Duration::from_millis(12));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "server": "server-1",
                "key": "k",
                "payload": "01020304",
                "elapsed_ms": 12,
            })
        );
    }

    #[test]
    fn test_server_status_from_state() {
        let state = ServerHealthState::new(
            "tcp://127.0.0.1:5555",
            HealthSettings::default(),
            Arc::new(ManualClock::new()),
        );
        assert_eq!(
            ServerStatus::from(&state),
            ServerStatus {
                endpoint: "tcp://127.0.0.1:5555".to_string(),
                alive: false,
            }
        );

        state.enable();
        assert!(ServerStatus::from(&state).alive);
    }
}
