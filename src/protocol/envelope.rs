use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::model::{ChatMessage, Profile, Sender, UNKNOWN_REGION};
use crate::core::{ChatError, ChatResult, WsFrame};

/// Discriminant of the readiness envelope sent once per socket.
pub const ENVELOPE_ACTIVATE: u8 = 1;
/// Discriminant of a chat send.
pub const ENVELOPE_CHAT_SEND: u8 = 2;
/// Discriminant of the keep-alive envelope.
pub const ENVELOPE_HEARTBEAT: u8 = 4;

/// Room id meaning "the public room".
const PUBLIC_ROOM_USER_ID: i64 = -1;

/// Structured outbound protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEnvelope {
    Activate,
    ChatSend(OutboundChat),
    Heartbeat,
}

/// Chat payload of a [`OutboundEnvelope::ChatSend`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundChat {
    pub message: ChatMessage,
}

impl OutboundChat {
    /// Build a chat send stamped with `sent_at`; the message id is the send time in
    /// epoch milliseconds.
    pub fn new(text: impl Into<String>, profile: Option<&Profile>, sent_at: DateTime<Utc>) -> Self {
        Self {
            message: ChatMessage {
                id: sent_at.timestamp_millis().to_string(),
                content: text.into(),
                sender: Sender::from_profile(profile),
                timestamp: sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                region: Some(UNKNOWN_REGION.to_string()),
                country: Some(UNKNOWN_REGION.to_string()),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.message.id
    }
}

#[derive(Serialize)]
struct ControlWire {
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatWire<'a> {
    #[serde(rename = "type")]
    kind: u8,
    user_id: i64,
    data: ChatDataWire<'a>,
}

#[derive(Serialize)]
struct ChatDataWire<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    content: ChatContentWire<'a>,
}

#[derive(Serialize)]
struct ChatContentWire<'a> {
    message: &'a ChatMessage,
}

impl OutboundEnvelope {
    pub fn discriminant(&self) -> u8 {
        match self {
            OutboundEnvelope::Activate => ENVELOPE_ACTIVATE,
            OutboundEnvelope::ChatSend(_) => ENVELOPE_CHAT_SEND,
            OutboundEnvelope::Heartbeat => ENVELOPE_HEARTBEAT,
        }
    }

    /// Serialize into exactly one text frame.
    pub fn encode(&self) -> ChatResult<WsFrame> {
        let json = match self {
            OutboundEnvelope::Activate | OutboundEnvelope::Heartbeat => {
                sonic_rs::to_string(&ControlWire {
                    kind: self.discriminant(),
                })
            }
            OutboundEnvelope::ChatSend(chat) => sonic_rs::to_string(&ChatWire {
                kind: ENVELOPE_CHAT_SEND,
                user_id: PUBLIC_ROOM_USER_ID,
                data: ChatDataWire {
                    kind: "chat",
                    content: ChatContentWire {
                        message: &chat.message,
                    },
                },
            }),
        }
        .map_err(|err| ChatError::InvalidState(format!("envelope serialization failed: {err}")))?;
        Ok(WsFrame::text(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sonic_rs::{JsonValueTrait, Value};

    fn sent_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 8, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn control_envelopes_are_bare_discriminants() {
        let activate = OutboundEnvelope::Activate.encode().expect("encodes");
        assert_eq!(activate.as_text(), Some("{\"type\":1}"));
        let heartbeat = OutboundEnvelope::Heartbeat.encode().expect("encodes");
        assert_eq!(heartbeat.as_text(), Some("{\"type\":4}"));
    }

    #[test]
    fn chat_envelope_shape() {
        let profile = Profile {
            id: "1001".to_string(),
            user_name: Some("carol".to_string()),
            user_role: Some("admin".to_string()),
            level: Some(5),
            points: 99,
            ..Profile::default()
        };
        let chat = OutboundChat::new("hello room", Some(&profile), sent_at());
        assert_eq!(chat.id(), sent_at().timestamp_millis().to_string());

        let frame = OutboundEnvelope::ChatSend(chat).encode().expect("encodes");
        let value: Value = sonic_rs::from_str(frame.as_text().expect("text")).expect("json");

        assert_eq!(value.get("type").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(value.get("userId").and_then(|v| v.as_i64()), Some(-1));
        let data = value.get("data").expect("data");
        assert_eq!(data.get("type").and_then(|v| v.as_str()), Some("chat"));
        let message = data
            .get("content")
            .and_then(|c| c.get("message"))
            .expect("content.message");
        assert_eq!(message.get("content").and_then(|v| v.as_str()), Some("hello room"));
        assert_eq!(
            message.get("timestamp").and_then(|v| v.as_str()),
            Some("2025-05-20T08:30:00.000Z")
        );
        assert_eq!(message.get("region").and_then(|v| v.as_str()), Some(UNKNOWN_REGION));
        let sender = message.get("sender").expect("sender");
        assert_eq!(sender.get("id").and_then(|v| v.as_str()), Some("1001"));
        assert_eq!(sender.get("name").and_then(|v| v.as_str()), Some("carol"));
        assert_eq!(sender.get("isAdmin").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(sender.get("level").and_then(|v| v.as_i64()), Some(5));
    }
}
