//! WebSocket wire format: client frames in, server frames out.
//!
//! Client → server:
//! - a text frame holding a JSON object with a `content` key is structured:
//!   `{"target": "<connection id>", "content": "..."}` with `target`
//!   optional, routed as a direct or room broadcast message. A structured
//!   frame whose `target` is not a valid connection id string is rejected
//!   back to the sender, never broadcast;
//! - any other text frame is broadcast verbatim;
//! - a binary frame is a [binary envelope](encode_binary) whose header may
//!   carry a `target`; its payload bytes are relayed unchanged.
//!
//! Server → client text frames use the [`WsMessage`] envelope. Binary
//! payloads go out as binary envelopes whose header names the sender.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ConnectionId, Envelope, Payload, PresenceEvent, RoomId};

/// Size of the big-endian header length that starts a binary envelope.
pub const BINARY_LENGTH_PREFIX: usize = 4;

/// Top-level server → client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Server-generated frame id.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: Value,
}

/// Discriminator for server → client message types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// First frame on every connection: tells the client its own id.
    Welcome,
    /// A relayed chat message.
    Message,
    /// Someone joined or left.
    Presence,
    /// The client sent something the server could not route.
    Error,
}

/// Result of decoding one client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// A routable message.
    Chat {
        /// Direct recipient, if any.
        target: Option<ConnectionId>,
        /// Message body.
        payload: Payload,
    },
    /// A frame that cannot be routed.
    Invalid(String),
}

/// Decodes a client text frame.
///
/// A JSON object with a `content` key is a structured frame; everything
/// else is plain text for broadcast.
#[must_use]
pub fn decode_text(text: &str) -> DecodedFrame {
    let plain = || DecodedFrame::Chat {
        target: None,
        payload: Payload::from(text),
    };
    if !text.trim_start().starts_with('{') {
        return plain();
    }
    let Ok(mut frame) = serde_json::from_str::<Map<String, Value>>(text) else {
        return plain();
    };
    let Some(content) = frame.remove("content") else {
        return plain();
    };
    let Value::String(content) = content else {
        return DecodedFrame::Invalid("content must be a string".to_string());
    };
    match target_of(&frame) {
        Ok(target) => DecodedFrame::Chat {
            target,
            payload: Payload::from(content),
        },
        Err(reason) => DecodedFrame::Invalid(reason),
    }
}

/// Decodes a client binary envelope.
///
/// The header may name a `target`; the remaining bytes are the payload.
#[must_use]
pub fn decode_binary(frame: &Bytes) -> DecodedFrame {
    let Some((header, payload)) = split_binary(frame) else {
        return DecodedFrame::Invalid(
            "binary frames must start with a 4-byte header length and a JSON object header"
                .to_string(),
        );
    };
    match target_of(&header) {
        Ok(target) => DecodedFrame::Chat {
            target,
            payload: Payload::Binary(payload),
        },
        Err(reason) => DecodedFrame::Invalid(reason),
    }
}

/// Reads the optional `target` field of a structured frame. Absent, null,
/// and empty mean broadcast; anything else must be a connection id string.
fn target_of(frame: &Map<String, Value>) -> Result<Option<ConnectionId>, String> {
    match frame.get("target") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.is_empty() => Ok(None),
        Some(Value::String(raw)) => raw
            .parse::<ConnectionId>()
            .map(Some)
            .map_err(|e| format!("{e}")),
        Some(other) => Err(format!("target must be a connection id string, got {other}")),
    }
}

/// Builds a binary envelope: a big-endian `u32` header length, the JSON
/// header, then the payload bytes untouched.
#[must_use]
pub fn encode_binary(header: &Value, payload: &[u8]) -> Bytes {
    let header = serde_json::to_vec(header).unwrap_or_default();
    let len = u32::try_from(header.len()).unwrap_or(u32::MAX);
    let mut frame = Vec::with_capacity(BINARY_LENGTH_PREFIX + header.len() + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Bytes::from(frame)
}

/// Splits a binary envelope into its JSON object header and payload.
/// Returns `None` if the frame is not a well-formed envelope.
#[must_use]
pub fn split_binary(frame: &Bytes) -> Option<(Map<String, Value>, Bytes)> {
    let prefix: [u8; BINARY_LENGTH_PREFIX] = frame.get(..BINARY_LENGTH_PREFIX)?.try_into().ok()?;
    let len = usize::try_from(u32::from_be_bytes(prefix)).ok()?;
    let end = BINARY_LENGTH_PREFIX.checked_add(len)?;
    let header = frame.get(BINARY_LENGTH_PREFIX..end)?;
    let header = serde_json::from_slice::<Map<String, Value>>(header).ok()?;
    Some((header, frame.slice(end..)))
}

/// Item queued on a connection's outbound channel.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    /// Greeting carrying the connection's own id.
    Welcome {
        /// Id assigned to the receiving connection.
        connection_id: ConnectionId,
        /// Owner of the connection.
        user_id: i64,
        /// Display name of the owner.
        username: String,
        /// Room the connection joined.
        room: RoomId,
    },
    /// A relayed envelope, shared between broadcast recipients.
    Message(Arc<Envelope>),
    /// A presence change, shared between recipients.
    Presence(Arc<PresenceEvent>),
    /// A routing error reported back to the sender.
    Error {
        /// Numeric error code.
        code: u32,
        /// Human-readable message.
        message: String,
    },
}

impl ServerFrame {
    /// Encodes the frame into a WebSocket message.
    #[must_use]
    pub fn encode(&self) -> Message {
        let (msg_type, timestamp, payload) = match self {
            Self::Welcome {
                connection_id,
                user_id,
                username,
                room,
            } => (
                WsMessageType::Welcome,
                Utc::now(),
                serde_json::json!({
                    "connection_id": connection_id,
                    "user_id": user_id,
                    "username": username,
                    "room": room,
                }),
            ),
            Self::Message(envelope) => {
                let mut fields = serde_json::json!({
                    "sender": envelope.sender,
                    "username": envelope.sender_name,
                    "target": envelope.target,
                    "room": envelope.room,
                });
                match &envelope.payload {
                    Payload::Binary(bytes) => {
                        if let Some(map) = fields.as_object_mut() {
                            map.insert(
                                "timestamp".to_string(),
                                Value::String(envelope.timestamp.to_rfc3339()),
                            );
                        }
                        return Message::Binary(encode_binary(&fields, bytes));
                    }
                    Payload::Text(text) => {
                        if let Some(map) = fields.as_object_mut() {
                            map.insert("content".to_string(), Value::String(text.to_string()));
                        }
                        (WsMessageType::Message, envelope.timestamp, fields)
                    }
                }
            }
            Self::Presence(event) => (
                WsMessageType::Presence,
                Utc::now(),
                serde_json::to_value(&**event).unwrap_or_default(),
            ),
            Self::Error { code, message } => (
                WsMessageType::Error,
                Utc::now(),
                serde_json::json!({ "code": code, "message": message }),
            ),
        };
        let msg = WsMessage {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type,
            timestamp,
            payload,
        };
        Message::text(serde_json::to_string(&msg).unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(msg: &Message) -> WsMessage {
        let Message::Text(text) = msg else {
            panic!("expected text frame, got {msg:?}");
        };
        let Ok(parsed) = serde_json::from_str::<WsMessage>(text.as_str()) else {
            panic!("server frame is not a WsMessage: {text}");
        };
        parsed
    }

    fn chat(target: Option<ConnectionId>, payload: impl Into<Payload>) -> DecodedFrame {
        DecodedFrame::Chat {
            target,
            payload: payload.into(),
        }
    }

    #[test]
    fn plain_text_is_broadcast() {
        assert_eq!(decode_text("hello there"), chat(None, "hello there"));
    }

    #[test]
    fn json_without_content_is_plain_text() {
        let raw = r#"{"foo": 1}"#;
        assert_eq!(decode_text(raw), chat(None, raw));
    }

    #[test]
    fn structured_frame_with_target() {
        let to = ConnectionId::new(9);
        let raw = format!(r#"{{"target": "{to}", "content": "hi"}}"#);
        assert_eq!(decode_text(&raw), chat(Some(to), "hi"));
    }

    #[test]
    fn null_or_empty_target_broadcasts() {
        assert_eq!(decode_text(r#"{"target": null, "content": "a"}"#), chat(None, "a"));
        assert_eq!(decode_text(r#"{"target": "", "content": "b"}"#), chat(None, "b"));
    }

    #[test]
    fn bad_target_is_rejected_not_broadcast() {
        let raw = r#"{"target": "nobody", "content": "secret"}"#;
        assert!(matches!(decode_text(raw), DecodedFrame::Invalid(_)));
    }

    #[test]
    fn non_string_target_is_rejected_not_broadcast() {
        for raw in [
            r#"{"target": 2, "content": "secret for b"}"#,
            r#"{"target": true, "content": "secret"}"#,
            r#"{"target": {"id": 2}, "content": "secret"}"#,
            r#"{"target": ["2"], "content": "secret"}"#,
        ] {
            assert!(
                matches!(decode_text(raw), DecodedFrame::Invalid(_)),
                "{raw} must not be routed"
            );
        }
    }

    #[test]
    fn non_string_content_is_rejected() {
        let raw = r#"{"content": 12}"#;
        assert!(matches!(decode_text(raw), DecodedFrame::Invalid(_)));
    }

    #[test]
    fn binary_envelope_with_target() {
        let to = ConnectionId::new(4);
        let frame = encode_binary(&serde_json::json!({ "target": to }), &[1, 2, 3]);
        assert_eq!(
            decode_binary(&frame),
            chat(Some(to), Bytes::from_static(&[1, 2, 3]))
        );
    }

    #[test]
    fn binary_envelope_without_target_broadcasts() {
        let frame = encode_binary(&serde_json::json!({}), &[0, 255]);
        assert_eq!(decode_binary(&frame), chat(None, Bytes::from_static(&[0, 255])));
    }

    #[test]
    fn malformed_binary_is_rejected() {
        for raw in [
            Bytes::from_static(&[0, 0]),
            Bytes::from_static(&[0, 0, 0, 9, b'{', b'}']),
            Bytes::from_static(&[0, 0, 0, 2, b'[', b']', 7]),
            Bytes::from_static(b"xyz"),
        ] {
            assert!(
                matches!(decode_binary(&raw), DecodedFrame::Invalid(_)),
                "{raw:?} must be rejected"
            );
        }
        let numeric = encode_binary(&serde_json::json!({ "target": 2 }), b"secret");
        assert!(matches!(decode_binary(&numeric), DecodedFrame::Invalid(_)));
    }

    #[test]
    fn text_message_round_trips_content() {
        let from = ConnectionId::new(1);
        let content = "héllo \"quoted\" \n line";
        let env = Envelope::broadcast(from, "alice", content);
        let msg = parse(&ServerFrame::Message(Arc::new(env)).encode());
        assert_eq!(msg.msg_type, WsMessageType::Message);
        assert_eq!(msg.payload["content"], content);
        assert_eq!(msg.payload["sender"], from.to_string());
        assert_eq!(msg.payload["username"], "alice");
        assert_eq!(msg.payload["room"], "lobby");
        assert!(msg.payload["target"].is_null());
    }

    #[test]
    fn binary_message_names_sender_and_keeps_bytes() {
        let from = ConnectionId::new(1);
        let raw = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
        let env = Envelope::broadcast(from, "alice", raw.clone());
        let Message::Binary(out) = ServerFrame::Message(Arc::new(env)).encode() else {
            panic!("binary payload must stay binary");
        };
        let Some((header, payload)) = split_binary(&out) else {
            panic!("server binary frame is not an envelope");
        };
        assert_eq!(payload, raw);
        assert_eq!(header.get("sender"), Some(&Value::String(from.to_string())));
        assert_eq!(header.get("username"), Some(&Value::String("alice".to_string())));
        assert_eq!(header.get("target"), Some(&Value::Null));
    }

    #[test]
    fn welcome_carries_connection_id_and_room() {
        let id = ConnectionId::new(3);
        let msg = parse(
            &ServerFrame::Welcome {
                connection_id: id,
                user_id: 3,
                username: "carol".to_string(),
                room: RoomId::lobby(),
            }
            .encode(),
        );
        assert_eq!(msg.msg_type, WsMessageType::Welcome);
        assert_eq!(msg.payload["connection_id"], id.to_string());
        assert_eq!(msg.payload["room"], "lobby");
    }
}
