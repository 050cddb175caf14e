//! Framework-generated control messages (§6, §9, §10.6).
//!
//! The gateway never parses application payloads on the bus, but it does
//! construct these itself: the server-driven keepalive ping and the
//! online/offline status events. Expressed as a tagged sum type rather than
//! an integer enum plus side payload, per the design note in §9.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "message_type")]
pub enum ControlMessage {
    #[serde(rename = "KEEPALIVE_PING")]
    KeepalivePing { trace_id: String },
    #[serde(rename = "USER_ONLINE")]
    UserOnline { trace_id: String },
    #[serde(rename = "USER_ONLINE_STATUS_ONLINE")]
    UserOnlineStatusOnline { trace_id: String },
    #[serde(rename = "USER_ONLINE_STATUS_OFFLINE")]
    UserOnlineStatusOffline { trace_id: String },
}

impl ControlMessage {
    pub fn trace_id(&self) -> &str {
        match self {
            ControlMessage::KeepalivePing { trace_id }
            | ControlMessage::UserOnline { trace_id }
            | ControlMessage::UserOnlineStatusOnline { trace_id }
            | ControlMessage::UserOnlineStatusOffline { trace_id } => trace_id,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // A malformed `ControlMessage` would be a programming error, not a
        // runtime condition callers can recover from.
        serde_json::to_vec(self).expect("control message must serialize")
    }
}

/// Literal pong body for client-driven liveness (§4.G).
pub const PONG_BODY: &[u8] = b"Success";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_ping_round_trips_through_json() {
        let msg = ControlMessage::KeepalivePing {
            trace_id: "t-1".to_string(),
        };
        let bytes = msg.to_bytes();
        let parsed: ControlMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn tag_matches_documented_wire_names() {
        let msg = ControlMessage::UserOnlineStatusOffline {
            trace_id: "t-2".to_string(),
        };
        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes()).unwrap();
        assert_eq!(
            value.get("message_type").and_then(|v| v.as_str()),
            Some("USER_ONLINE_STATUS_OFFLINE")
        );
    }

    #[test]
    fn trace_id_accessor_covers_every_variant() {
        assert_eq!(
            ControlMessage::UserOnline {
                trace_id: "abc".into()
            }
            .trace_id(),
            "abc"
        );
    }
}
