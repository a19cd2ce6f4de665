use bytes::Bytes;

/// Transport-neutral websocket frame type.
///
/// Transports convert their native frame representation into/from `WsFrame`; the
/// connection actor and codec only ever see this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

/// Normal closure, sent when the client disconnects on purpose.
pub const CLOSE_NORMAL: u16 = 1000;

impl WsFrame {
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        // String is valid UTF-8 by construction.
        Self::Text(Bytes::from(s.into()))
    }

    #[inline]
    pub fn close(code: u16, reason: impl Into<Bytes>) -> Self {
        Self::Close(Some(WsCloseFrame {
            code,
            reason: reason.into(),
        }))
    }

    /// Data frames carry application payloads; control frames never reach the codec.
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, WsFrame::Text(_) | WsFrame::Binary(_))
    }

    /// Text payload as `&str`, if this is a text frame holding valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsFrame::Text(bytes) => std::str::from_utf8(bytes.as_ref()).ok(),
            _ => None,
        }
    }
}

/// Borrow the underlying bytes from frames without allocation.
#[inline]
pub fn frame_bytes(frame: &WsFrame) -> Option<&[u8]> {
    match frame {
        WsFrame::Text(bytes) => Some(bytes.as_ref()),
        WsFrame::Binary(bytes) => Some(bytes.as_ref()),
        WsFrame::Ping(bytes) => Some(bytes.as_ref()),
        WsFrame::Pong(bytes) => Some(bytes.as_ref()),
        WsFrame::Close(_) => None,
    }
}

/// Human-readable close description used in logs and the disconnected callback.
pub fn describe_close(frame: Option<&WsCloseFrame>) -> String {
    frame
        .map(|f| {
            format!(
                "code={} reason={}",
                f.code,
                String::from_utf8_lossy(f.reason.as_ref())
            )
        })
        .unwrap_or_else(|| "remote closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frames_expose_str() {
        let frame = WsFrame::text("{\"type\":4}");
        assert!(frame.is_data());
        assert_eq!(frame.as_text(), Some("{\"type\":4}"));
        assert_eq!(frame_bytes(&frame), Some(&b"{\"type\":4}"[..]));
    }

    #[test]
    fn close_description() {
        let frame = WsCloseFrame {
            code: 1001,
            reason: Bytes::from_static(b"going away"),
        };
        assert_eq!(describe_close(Some(&frame)), "code=1001 reason=going away");
        assert_eq!(describe_close(None), "remote closed");
        assert!(!WsFrame::close(CLOSE_NORMAL, "bye").is_data());
    }
}
