//! Kameo-based client for a token-authenticated, auto-reconnecting chat-room websocket.

pub mod api;
pub mod client;
pub mod config;
pub mod core;
pub mod events;
pub mod protocol;
pub mod testing;
pub mod transport;
pub mod ws;

pub use api::{Credential, HttpApi, ProfileResolver};
pub use client::ChatClient;
pub use config::{ChatConfig, DisplayPreferences};
pub use crate::core::{
    ChatError, ChatErrorKind, ChatResult, ConnectionState, FixedDelayReconnect, MessageBuffer,
    WsFrame, WsReconnectStrategy,
};
pub use events::{DisconnectReason, EventHub};
pub use protocol::{ChatMessage, InboundKind, InboundMessage, OnlineUser, Profile, Sender};
