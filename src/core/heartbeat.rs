use std::time::Duration;

use super::frame::WsFrame;
use super::types::ChatResult;
use crate::protocol::OutboundEnvelope;

/// Interval between keep-alive envelopes while the socket is open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Application-level keep-alive: a `{"type":4}` envelope on a fixed interval.
///
/// The server never answers heartbeats, so unlike a ping/pong strategy there is no
/// staleness tracking; the socket's own close/error events drive reconnects.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    sent: u64,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sent: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Build the next heartbeat frame and record that it is going out.
    pub fn create_beat(&mut self) -> ChatResult<WsFrame> {
        let frame = OutboundEnvelope::Heartbeat.encode()?;
        self.sent = self.sent.saturating_add(1);
        Ok(frame)
    }

    /// Heartbeats sent since the socket opened.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn reset(&mut self) {
        self.sent = 0;
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_is_type_four_envelope() {
        let mut heartbeat = Heartbeat::default();
        assert_eq!(heartbeat.interval(), Duration::from_secs(25));

        let frame = heartbeat.create_beat().expect("heartbeat encodes");
        assert_eq!(frame.as_text(), Some("{\"type\":4}"));
        assert_eq!(heartbeat.sent(), 1);

        heartbeat.reset();
        assert_eq!(heartbeat.sent(), 0);
    }
}
