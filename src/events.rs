//! Event surface between the connection actor and its consumer.
//!
//! Six channels:
//!
//! - `message`: every decoded inbound frame, chat or otherwise
//! - `connected`: a socket reached Open
//! - `error`: a connect attempt or an open socket failed
//! - `user_online` / `user_offline`: registrable, never fired (presence is disabled server-side)
//! - `disconnected`: an Open socket dropped or was closed locally
//!
//! `on_*` replaces whatever is registered on that channel; `add_*_listener` appends.
//! Handlers run on the actor task, in frame arrival order, and must not block.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::ChatError;
use crate::protocol::{InboundMessage, OnlineUser};

/// Why an Open socket stopped being Open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub message: String,
    /// Close code sent by the peer, when there was one.
    pub code: Option<u16>,
    /// `true` when the drop came from `disconnect()` rather than the network.
    pub user_initiated: bool,
}

impl DisconnectReason {
    pub fn remote(message: impl Into<String>, code: Option<u16>) -> Self {
        Self {
            message: message.into(),
            code,
            user_initiated: false,
        }
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            user_initiated: true,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

pub type OnMessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
pub type OnConnectedCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(&ChatError) + Send + Sync>;
pub type OnUserOnlineCallback = Arc<dyn Fn(&[OnlineUser]) + Send + Sync>;
pub type OnUserOfflineCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type OnDisconnectedCallback = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;

#[derive(Default)]
struct Channels {
    message: Vec<OnMessageCallback>,
    connected: Vec<OnConnectedCallback>,
    error: Vec<OnErrorCallback>,
    user_online: Vec<OnUserOnlineCallback>,
    user_offline: Vec<OnUserOfflineCallback>,
    disconnected: Vec<OnDisconnectedCallback>,
}

/// Shared handler registry. Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<RwLock<Channels>>,
}

macro_rules! channel {
    ($(#[$emit_attr:meta])* $set:ident, $add:ident, $emit:ident, $field:ident, $cb:ty, ($($arg:ident: $ty:ty),*)) => {
        pub fn $set<F>(&self, handler: F)
        where
            F: Fn($($ty),*) + Send + Sync + 'static,
        {
            let handler: $cb = Arc::new(handler);
            self.inner.write().$field = vec![handler];
        }

        pub fn $add<F>(&self, handler: F)
        where
            F: Fn($($ty),*) + Send + Sync + 'static,
        {
            let handler: $cb = Arc::new(handler);
            self.inner.write().$field.push(handler);
        }

        $(#[$emit_attr])*
        pub(crate) fn $emit(&self, $($arg: $ty),*) {
            // Snapshot so handlers may register handlers without deadlocking.
            let handlers = self.inner.read().$field.clone();
            for handler in handlers {
                handler($($arg),*);
            }
        }
    };
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    channel!(on_message, add_message_listener, emit_message, message, OnMessageCallback, (message: &InboundMessage));
    channel!(on_connected, add_connected_listener, emit_connected, connected, OnConnectedCallback, ());
    channel!(on_error, add_error_listener, emit_error, error, OnErrorCallback, (error: &ChatError));
    // Presence is disabled server-side, so these never fire.
    channel!(#[allow(dead_code)] on_user_online, add_user_online_listener, emit_user_online, user_online, OnUserOnlineCallback, (users: &[OnlineUser]));
    channel!(#[allow(dead_code)] on_user_offline, add_user_offline_listener, emit_user_offline, user_offline, OnUserOfflineCallback, (user_id: &str));
    channel!(on_disconnected, add_disconnected_listener, emit_disconnected, disconnected, OnDisconnectedCallback, (reason: &DisconnectReason));
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.inner.read();
        f.debug_struct("EventHub")
            .field("message", &channels.message.len())
            .field("connected", &channels.connected.len())
            .field("error", &channels.error.len())
            .field("user_online", &channels.user_online.len())
            .field("user_offline", &channels.user_offline.len())
            .field("disconnected", &channels.disconnected.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn setter_replaces_previous_handler() {
        let hub = EventHub::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        hub.on_connected(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        hub.on_connected(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit_connected();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_fan_out_in_registration_order() {
        let hub = EventHub::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            hub.add_error_listener(move |err| seen.lock().push(format!("{tag}:{:?}", err.kind())));
        }
        hub.emit_error(&ChatError::ProtocolParse("x".to_string()));
        assert_eq!(seen.lock().len(), 2);
        assert!(seen.lock()[0].starts_with("a:"));
    }

    #[test]
    fn handlers_may_register_during_emit() {
        let hub = EventHub::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = hub.clone();
        let counter = Arc::clone(&fired);
        hub.on_disconnected(move |_| {
            let counter = Arc::clone(&counter);
            inner.add_connected_listener(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        hub.emit_disconnected(&DisconnectReason::local("bye"));
        hub.emit_connected();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reason_display() {
        assert_eq!(
            DisconnectReason::remote("going away", Some(1001)).to_string(),
            "going away (code: 1001)"
        );
        assert!(DisconnectReason::local("bye").user_initiated);
    }
}
