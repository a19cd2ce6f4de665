use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::protocol::{ChatMessage, LOCAL_ECHO_SENDER_ID, Profile, Sender};

/// Region label shown on optimistic local copies.
pub const LOCAL_REGION: &str = "本地";

/// Where a buffered message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Optimistic copy of something this client sent.
    Local,
    /// Received from the server, live or through history.
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferedMessage {
    pub origin: Origin,
    pub message: ChatMessage,
}

/// Outcome of [`MessageBuffer::push_inbound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    Appended,
    /// Carried the local-echo sentinel; a local copy is already shown.
    Ignored,
}

/// Bounded rolling view of the room.
///
/// - `push_*` is O(1) and evicts the oldest entry when full.
/// - Capacity 0 stores nothing.
#[derive(Debug, Clone, Default)]
pub struct MessageBuffer {
    buffer: VecDeque<BufferedMessage>,
    capacity: usize,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an optimistic copy of an outgoing message and return it.
    ///
    /// The copy carries the sentinel sender id, so a server echo of it is never shown twice.
    pub fn push_local_echo(
        &mut self,
        text: impl Into<String>,
        profile: Option<&Profile>,
        sent_at: DateTime<Utc>,
    ) -> ChatMessage {
        let mut sender = Sender::from_profile(profile);
        sender.id = LOCAL_ECHO_SENDER_ID.to_string();
        sender.region = LOCAL_REGION.to_string();
        sender.country = LOCAL_REGION.to_string();

        let message = ChatMessage {
            id: sent_at.timestamp_millis().to_string(),
            content: text.into(),
            sender,
            timestamp: sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            region: None,
            country: None,
        };
        self.push(Origin::Local, message.clone());
        message
    }

    pub fn push_inbound(&mut self, message: ChatMessage) -> InboundDisposition {
        if message.sender.is_local_echo() {
            return InboundDisposition::Ignored;
        }
        self.push(Origin::Remote, message);
        InboundDisposition::Appended
    }

    /// Reset to a fetched history page, given in chronological order.
    pub fn replace_with_history(&mut self, records: Vec<ChatMessage>) {
        self.buffer.clear();
        let skip = records.len().saturating_sub(self.capacity);
        for message in records.into_iter().skip(skip) {
            self.push(Origin::Remote, message);
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BufferedMessage> {
        self.buffer.iter()
    }

    pub fn back(&self) -> Option<&BufferedMessage> {
        self.buffer.back()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn push(&mut self, origin: Origin, message: ChatMessage) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(BufferedMessage { origin, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Sender;

    fn remote(id: &str, sender_id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            content: format!("msg {id}"),
            sender: Sender {
                id: sender_id.to_string(),
                ..Sender::default()
            },
            ..ChatMessage::default()
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = MessageBuffer::new(2);
        buffer.push_inbound(remote("1", "a"));
        buffer.push_inbound(remote("2", "a"));
        buffer.push_inbound(remote("3", "a"));
        let ids: Vec<_> = buffer.iter().map(|m| m.message.id.as_str()).collect();
        assert_eq!(ids, ["2", "3"]);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buffer = MessageBuffer::new(0);
        assert_eq!(buffer.push_inbound(remote("1", "a")), InboundDisposition::Appended);
        let echo = buffer.push_local_echo("hi", None, Utc::now());
        assert_eq!(echo.content, "hi");
        assert!(buffer.is_empty());
    }

    #[test]
    fn local_echo_uses_sentinel_and_suppresses_duplicates() {
        let mut buffer = MessageBuffer::new(8);
        let profile = Profile {
            id: "42".to_string(),
            user_name: Some("erin".to_string()),
            ..Profile::default()
        };
        let echo = buffer.push_local_echo("hello", Some(&profile), Utc::now());
        assert_eq!(echo.sender.id, LOCAL_ECHO_SENDER_ID);
        assert_eq!(echo.sender.name, "erin");
        assert_eq!(echo.sender.region, LOCAL_REGION);
        assert_eq!(buffer.back().map(|m| m.origin), Some(Origin::Local));

        assert_eq!(buffer.push_inbound(echo.clone()), InboundDisposition::Ignored);
        assert_eq!(buffer.push_inbound(remote("9", "42")), InboundDisposition::Appended);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn history_keeps_newest_records() {
        let mut buffer = MessageBuffer::new(2);
        buffer.push_inbound(remote("old", "a"));
        buffer.replace_with_history(vec![remote("1", "a"), remote("2", "b"), remote("3", "c")]);
        let ids: Vec<_> = buffer.iter().map(|m| m.message.id.as_str()).collect();
        assert_eq!(ids, ["2", "3"]);
        assert!(buffer.iter().all(|m| m.origin == Origin::Remote));
    }
}
