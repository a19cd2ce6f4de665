use bytes::Bytes;
use serde::Deserialize;
use serde::de::IgnoredAny;
use sonic_rs::{JsonValueTrait, Value};

use super::model::ChatMessage;
use crate::core::{ChatError, ChatResult, WsFrame};

/// Classification of an inbound frame by its `type` field.
///
/// Only `"chat"` is recognized; every other discriminant is carried as-is so the
/// consumer can discriminate further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Chat,
    Named(String),
    Numeric(i64),
    Missing,
}

/// One decoded inbound frame. The parsed JSON and the original payload are both kept
/// so unclassified frames pass through verbatim.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    kind: InboundKind,
    raw: Value,
    payload: Bytes,
}

#[derive(Deserialize)]
struct InboundHeader {
    #[serde(rename = "type", default)]
    kind: Option<RawKind>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKind {
    Name(String),
    Number(i64),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
struct DataView<D> {
    data: D,
}

#[derive(Deserialize)]
struct Direct {
    message: ChatMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Wrapped {
    message_wrapper: Slot,
}

#[derive(Deserialize)]
struct Nested {
    content: Slot,
}

#[derive(Deserialize)]
struct Slot {
    message: ChatMessage,
}

impl InboundMessage {
    pub fn kind(&self) -> &InboundKind {
        &self.kind
    }

    pub fn is_chat(&self) -> bool {
        self.kind == InboundKind::Chat
    }

    /// Parsed JSON of the whole frame.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Frame payload exactly as received.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_ref()
    }

    /// Extract the chat message, wherever this frame shape keeps it.
    ///
    /// Server broadcasts use `data.message`, history-style records use
    /// `data.messageWrapper.message`, and echoed client sends use `data.content.message`.
    pub fn chat_message(&self) -> Option<ChatMessage> {
        let bytes = self.payload.as_ref();
        if let Ok(view) = sonic_rs::from_slice::<DataView<Direct>>(bytes) {
            return Some(view.data.message);
        }
        if let Ok(view) = sonic_rs::from_slice::<DataView<Wrapped>>(bytes) {
            return Some(view.data.message_wrapper.message);
        }
        sonic_rs::from_slice::<DataView<Nested>>(bytes)
            .ok()
            .map(|view| view.data.content.message)
    }
}

/// Decode one data frame. Control frames yield `Ok(None)`.
pub fn decode_inbound(frame: &WsFrame) -> ChatResult<Option<InboundMessage>> {
    match frame {
        WsFrame::Text(bytes) | WsFrame::Binary(bytes) => decode_payload(bytes.clone()).map(Some),
        WsFrame::Ping(_) | WsFrame::Pong(_) | WsFrame::Close(_) => Ok(None),
    }
}

/// Parse and classify a single payload. Failures are isolated to this payload.
pub fn decode_payload(payload: Bytes) -> ChatResult<InboundMessage> {
    let raw: Value = sonic_rs::from_slice(payload.as_ref())
        .map_err(|err| ChatError::ProtocolParse(err.to_string()))?;
    if !raw.is_object() {
        return Err(ChatError::ProtocolParse("frame is not a JSON object".to_string()));
    }
    let header: InboundHeader = sonic_rs::from_slice(payload.as_ref())
        .map_err(|err| ChatError::ProtocolParse(err.to_string()))?;

    let kind = match header.kind {
        Some(RawKind::Name(name)) if name == "chat" => InboundKind::Chat,
        Some(RawKind::Name(name)) => InboundKind::Named(name),
        Some(RawKind::Number(n)) => InboundKind::Numeric(n),
        Some(RawKind::Other(_)) | None => InboundKind::Missing,
    };

    Ok(InboundMessage { kind, raw, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OutboundChat, OutboundEnvelope, Profile};
    use chrono::Utc;

    #[test]
    fn chat_frames_are_classified_and_extracted() {
        let frame = WsFrame::text(
            r#"{"type":"chat","data":{"message":{"id":"17","content":"hi","sender":{"id":"9","name":"dan"},"timestamp":"1716190000000"}}}"#,
        );
        let message = decode_inbound(&frame).expect("decodes").expect("data frame");
        assert!(message.is_chat());
        let chat = message.chat_message().expect("chat payload");
        assert_eq!(chat.id, "17");
        assert_eq!(chat.content, "hi");
        assert_eq!(chat.sender.name, "dan");
    }

    #[test]
    fn chat_frames_with_null_sender_fields_still_extract() {
        let frame = WsFrame::text(
            r#"{"type":"chat","data":{"message":{"id":"18","content":"yo","sender":{"id":"9","name":"dan","avatar":null,"level":null},"timestamp":"1716190000000"}}}"#,
        );
        let message = decode_inbound(&frame).expect("decodes").expect("data frame");
        let chat = message.chat_message().expect("chat payload");
        assert_eq!(chat.id, "18");
        assert!(chat.sender.avatar.is_empty());
        assert_eq!(chat.sender.level, 0);
    }

    #[test]
    fn other_discriminants_pass_through() {
        let named = decode_payload(Bytes::from_static(br#"{"type":"userOnline","data":[]}"#))
            .expect("decodes");
        assert_eq!(named.kind(), &InboundKind::Named("userOnline".to_string()));
        assert!(named.chat_message().is_none());
        assert_eq!(named.payload(), br#"{"type":"userOnline","data":[]}"#);

        let numeric = decode_payload(Bytes::from_static(br#"{"type":3}"#)).expect("decodes");
        assert_eq!(numeric.kind(), &InboundKind::Numeric(3));

        let missing = decode_payload(Bytes::from_static(br#"{"data":1}"#)).expect("decodes");
        assert_eq!(missing.kind(), &InboundKind::Missing);

        let odd = decode_payload(Bytes::from_static(br#"{"type":true}"#)).expect("decodes");
        assert_eq!(odd.kind(), &InboundKind::Missing);
    }

    #[test]
    fn malformed_payloads_are_parse_errors() {
        for bad in [&b"{not json"[..], b"", b"\"just a string\"", b"[1,2,3]"] {
            let err = decode_payload(Bytes::copy_from_slice(bad)).expect_err("rejects");
            assert!(matches!(err, ChatError::ProtocolParse(_)), "{err:?}");
        }
    }

    #[test]
    fn control_frames_are_skipped() {
        assert!(decode_inbound(&WsFrame::Ping(Bytes::new())).expect("ok").is_none());
        assert!(decode_inbound(&WsFrame::Close(None)).expect("ok").is_none());
    }

    #[test]
    fn echoed_send_round_trips_id_and_text() {
        let profile = Profile {
            id: "5".to_string(),
            ..Profile::default()
        };
        let chat = OutboundChat::new("ping from me", Some(&profile), Utc::now());
        let id = chat.id().to_string();
        let frame = OutboundEnvelope::ChatSend(chat).encode().expect("encodes");

        let echoed = decode_inbound(&frame).expect("decodes").expect("data");
        assert_eq!(echoed.kind(), &InboundKind::Numeric(2));
        let message = echoed.chat_message().expect("nested message");
        assert_eq!(message.id, id);
        assert_eq!(message.content, "ping from me");
        assert_eq!(message.sender.id, "5");
    }
}
