use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Convenience result alias for chat client operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Canonical error surface shared across the client.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// The credential was rejected (non-zero response code or no identity in the profile).
    #[error("Authentication failed: {message}")]
    Auth { message: String, code: Option<i64> },

    /// DNS / TCP / TLS / HTTP failure while fetching the profile or opening the socket.
    #[error("Network error ({context}): {error}")]
    Network {
        context: &'static str,
        error: String,
    },

    /// An inbound frame could not be decoded. Never propagated past the frame boundary.
    #[error("Protocol parse failed: {0}")]
    ProtocolParse(String),

    #[error("Not connected (state={state})")]
    NotConnected { state: ConnectionState },

    /// IO failure on an already-open socket.
    #[error("Transport error ({context}): {error}")]
    Transport {
        context: &'static str,
        error: String,
    },

    /// A pending connect was superseded by `disconnect()`.
    #[error("Connect cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of [`ChatError`] for callers that branch on failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    Auth,
    Network,
    ProtocolParse,
    NotConnected,
    Transport,
    Cancelled,
    InvalidState,
    Actor,
    Config,
}

impl ChatError {
    pub fn kind(&self) -> ChatErrorKind {
        match self {
            ChatError::Auth { .. } => ChatErrorKind::Auth,
            ChatError::Network { .. } => ChatErrorKind::Network,
            ChatError::ProtocolParse(_) => ChatErrorKind::ProtocolParse,
            ChatError::NotConnected { .. } => ChatErrorKind::NotConnected,
            ChatError::Transport { .. } => ChatErrorKind::Transport,
            ChatError::Cancelled(_) => ChatErrorKind::Cancelled,
            ChatError::InvalidState(_) => ChatErrorKind::InvalidState,
            ChatError::Actor(_) => ChatErrorKind::Actor,
            ChatError::Config(_) => ChatErrorKind::Config,
        }
    }

    pub(crate) fn network(context: &'static str, err: impl ToString) -> Self {
        ChatError::Network {
            context,
            error: err.to_string(),
        }
    }

    pub(crate) fn transport(context: &'static str, err: impl ToString) -> Self {
        ChatError::Transport {
            context,
            error: err.to_string(),
        }
    }

    /// Message shown to a person when the credential is the problem.
    pub fn user_guidance(&self) -> Option<&'static str> {
        match self {
            ChatError::Auth { .. } => {
                Some("token is invalid or expired; copy a fresh token from the web client")
            }
            ChatError::Network { .. } => Some("check the network connection and the token"),
            _ => None,
        }
    }
}

/// Lifecycle of the single socket owned by a connection actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Authenticating,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        };
        f.write_str(label)
    }
}

/// Transport-independent buffer sizing parameters used for websocket configuration.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct WebSocketBufferConfig {
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for WebSocketBufferConfig {
    fn default() -> Self {
        Self {
            // Chat frames are small; these bounds only guard against a misbehaving server.
            write_buffer_bytes: 128 << 10,
            max_write_buffer_bytes: 256 << 10,
            max_message_bytes: 4 * 1024 * 1024,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}
