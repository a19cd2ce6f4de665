//! Public handle over the connection actor.

use std::sync::Arc;

use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef};
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::api::{Credential, HttpApi, ProfileResolver};
use crate::config::ChatConfig;
use crate::core::{
    ChatError, ChatResult, ConnectionState, FixedDelayReconnect, WsReconnectStrategy,
};
use crate::events::{DisconnectReason, EventHub};
use crate::protocol::{ChatMessage, InboundMessage, OnlineUser, Profile};
use crate::transport::{TungsteniteTransport, WsTransport};
use crate::ws::{ChatConnectionActor, ChatConnectionArgs, Connect, Disconnect, GetProfile, SendChat};

fn actor_error<M, E: Into<ChatError>>(err: SendError<M, E>) -> ChatError {
    match err {
        SendError::HandlerError(err) => err.into(),
        SendError::ActorNotRunning(_) | SendError::ActorStopped => {
            ChatError::Actor("connection actor is not running".to_string())
        }
        SendError::MailboxFull(_) => ChatError::Actor("connection actor mailbox full".to_string()),
        _ => ChatError::Actor("connection actor unavailable".to_string()),
    }
}

/// A chat connection: one credential, at most one socket.
///
/// Dropping the client kills the connection actor, which closes any open socket.
pub struct ChatClient<T = TungsteniteTransport, P = HttpApi, R = FixedDelayReconnect>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    actor: ActorRef<ChatConnectionActor<T, P, R>>,
    events: EventHub,
    state_rx: watch::Receiver<ConnectionState>,
    config: Arc<ChatConfig>,
    credential: Credential,
    api: HttpApi,
}

impl ChatClient {
    /// Client backed by the real HTTP API and tokio-tungstenite.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ChatConfig, credential: Credential) -> ChatResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let api = HttpApi::new(Arc::clone(&config))?;
        let reconnect = FixedDelayReconnect::new(config.reconnect_delay);
        Self::with_parts(
            config,
            credential,
            TungsteniteTransport::default(),
            api,
            reconnect,
        )
    }
}

impl<T, P, R> ChatClient<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    /// Client with explicit collaborators. History requests still go through `HttpApi`.
    pub fn with_parts(
        config: Arc<ChatConfig>,
        credential: Credential,
        transport: T,
        resolver: P,
        reconnect: R,
    ) -> ChatResult<Self> {
        let api = HttpApi::new(Arc::clone(&config))?;
        let events = EventHub::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let actor = ChatConnectionActor::spawn(ChatConnectionArgs {
            config: Arc::clone(&config),
            credential: credential.clone(),
            transport,
            resolver,
            reconnect,
            events: events.clone(),
            state_tx,
        });
        Ok(Self {
            actor,
            events,
            state_rx,
            config,
            credential,
            api,
        })
    }

    /// Resolve the profile and open the socket.
    ///
    /// Joins the attempt in flight if there is one, and returns immediately when
    /// already Open.
    pub async fn connect(&self) -> ChatResult<()> {
        let (reply, rx) = oneshot::channel();
        self.actor
            .tell(Connect { reply })
            .send()
            .await
            .map_err(|_| ChatError::Actor("connection actor is not running".to_string()))?;
        rx.await
            .map_err(|_| ChatError::Cancelled("connection actor dropped the request".to_string()))?
    }

    /// Close the socket, stop timers and suppress reconnects. Safe to call in any state.
    pub async fn disconnect(&self) -> ChatResult<()> {
        self.actor.ask(Disconnect).await.map_err(actor_error)
    }

    /// Send one chat message and return its send-time id.
    ///
    /// Fails with `NotConnected` unless the socket is Open; nothing is queued.
    pub async fn send_message(&self, text: impl Into<String>) -> ChatResult<String> {
        self.actor
            .ask(SendChat { text: text.into() })
            .await
            .map_err(actor_error)
    }

    /// Profile resolved by the most recent connect attempt.
    pub async fn profile(&self) -> ChatResult<Option<Profile>> {
        self.actor.ask(GetProfile).await.map_err(actor_error)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.events.on_message(handler);
    }

    pub fn on_connected<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_connected(handler);
    }

    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&ChatError) + Send + Sync + 'static,
    {
        self.events.on_error(handler);
    }

    pub fn on_user_online<F>(&self, handler: F)
    where
        F: Fn(&[OnlineUser]) + Send + Sync + 'static,
    {
        self.events.on_user_online(handler);
    }

    pub fn on_user_offline<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.events.on_user_offline(handler);
    }

    pub fn on_disconnected<F>(&self, handler: F)
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.events.on_disconnected(handler);
    }

    /// Newest page of the public room, oldest first. `None` uses the configured size.
    pub async fn history(&self, page_size: Option<u32>) -> ChatResult<Vec<ChatMessage>> {
        let page_size = page_size.unwrap_or(self.config.history_page_size);
        self.api.fetch_history(&self.credential, page_size).await
    }

    /// Disconnect and stop the actor, waiting for it to finish.
    pub async fn shutdown(self) -> ChatResult<()> {
        self.disconnect().await?;
        let _ = self.actor.stop_gracefully().await;
        self.actor.wait_for_shutdown().await;
        debug!("chat client shut down");
        Ok(())
    }
}

impl<T, P, R> Drop for ChatClient<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    fn drop(&mut self) {
        if self.actor.is_alive() {
            self.actor.kill();
        }
    }
}
