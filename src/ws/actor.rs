//! Connection actor.
//!
//! The actor owns the socket lifecycle: profile resolution, handshake, activation,
//! heartbeats, teardown and reconnect. Socket IO and timers run in spawned tasks that
//! only ever `tell` the actor; every message they send carries the generation of the
//! attempt that spawned them, so completions that arrive after the attempt was
//! superseded are dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::writer::{WriterWrite, WsWriterActor};
use crate::api::{Credential, ProfileResolver};
use crate::config::{ChatConfig, TOKEN_HEADER};
use crate::core::{
    CLOSE_NORMAL, ChatError, ChatResult, ConnectionState, Heartbeat, WsFrame,
    WsReconnectStrategy, describe_close,
};
use crate::events::{DisconnectReason, EventHub};
use crate::protocol::{OutboundChat, OutboundEnvelope, Profile, decode_inbound};
use crate::transport::{WsHandshake, WsTransport};

/// Upper bound on flushing the close frame, and on the writer stopping, during teardown.
const WRITER_STOP_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on a single frame write. A stalled sink must not block the actor mailbox.
const WRITER_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Arguments passed when constructing a connection actor.
pub struct ChatConnectionArgs<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    pub config: Arc<ChatConfig>,
    pub credential: Credential,
    pub transport: T,
    pub resolver: P,
    pub reconnect: R,
    pub events: EventHub,
    pub state_tx: watch::Sender<ConnectionState>,
}

/// Why the current attempt started. Only unattended attempts re-arm the reconnect timer
/// when they fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttemptOrigin {
    Caller,
    Reconnect,
}

pub struct ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    config: Arc<ChatConfig>,
    credential: Credential,
    transport: T,
    resolver: P,
    reconnect: R,
    heartbeat: Heartbeat,
    events: EventHub,
    actor_ref: ActorRef<Self>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    generation: u64,
    origin: AttemptOrigin,
    /// Set after an unsolicited drop until the socket is Open again or the caller disconnects.
    recovering: bool,
    waiters: Vec<oneshot::Sender<ChatResult<()>>>,
    profile: Option<Profile>,
    writer_ref: Option<ActorRef<WsWriterActor<T::Writer>>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    attempt_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    reconnect_epoch: u64,
    reconnect_attempt: u64,
}

impl<T, P, R> Actor for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Args = ChatConnectionArgs<T, P, R>;
    type Error = ChatError;

    fn name() -> &'static str {
        "ChatConnectionActor"
    }

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> ChatResult<Self> {
        let ChatConnectionArgs {
            config,
            credential,
            transport,
            resolver,
            reconnect,
            events,
            state_tx,
        } = args;

        let heartbeat = Heartbeat::new(config.heartbeat_interval);
        state_tx.send_replace(ConnectionState::Disconnected);

        Ok(Self {
            config,
            credential,
            transport,
            resolver,
            reconnect,
            heartbeat,
            events,
            actor_ref,
            state: ConnectionState::Disconnected,
            state_tx,
            generation: 0,
            origin: AttemptOrigin::Caller,
            recovering: false,
            waiters: Vec::new(),
            profile: None,
            writer_ref: None,
            shutdown_tx: None,
            attempt_task: None,
            reader_task: None,
            heartbeat_task: None,
            reconnect_task: None,
            reconnect_epoch: 0,
            reconnect_attempt: 0,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> ChatResult<()> {
        self.cancel_reconnect();
        if let Some(task) = self.attempt_task.take() {
            task.abort();
        }
        self.teardown_socket(None).await;
        self.settle_waiters(Err(ChatError::Cancelled("client shut down".to_string())));
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "ChatConnectionActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Public messages
// ---------------------------------------------------------------------------

/// Start a connection, or join the attempt already in flight.
///
/// `reply` resolves once the socket is Open, or with the error that ended the attempt.
pub struct Connect {
    pub reply: oneshot::Sender<ChatResult<()>>,
}

/// Tear down the socket, cancel timers and suppress reconnects. Idempotent.
#[derive(Clone, Copy, Debug)]
pub struct Disconnect;

/// Send one chat message. Replies with the message id.
#[derive(Clone, Debug)]
pub struct SendChat {
    pub text: String,
}

#[derive(Clone, Copy, Debug)]
pub struct GetProfile;

#[derive(Clone, Copy, Debug)]
pub struct GetState;

impl<T, P, R> KameoMessage<Connect> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match self.state {
            ConnectionState::Open => {
                let _ = msg.reply.send(Ok(()));
            }
            ConnectionState::Authenticating | ConnectionState::Connecting => {
                debug!(
                    connection = %self.connection_label(),
                    state = %self.state,
                    "connect already in flight; joining"
                );
                self.waiters.push(msg.reply);
            }
            ConnectionState::Disconnected | ConnectionState::Closing => {
                // An early connect replaces the pending timer but stays in the retry cycle.
                let origin = if self.recovering {
                    AttemptOrigin::Reconnect
                } else {
                    AttemptOrigin::Caller
                };
                self.cancel_reconnect();
                self.waiters.push(msg.reply);
                self.begin_attempt(origin);
            }
        }
    }
}

impl<T, P, R> KameoMessage<Disconnect> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ChatResult<()>;

    async fn handle(&mut self, _msg: Disconnect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let previous = self.state;
        self.set_state(ConnectionState::Closing);
        // Anything still in flight belongs to a superseded attempt from here on.
        self.generation = self.generation.wrapping_add(1);
        self.recovering = false;
        self.cancel_reconnect();
        if let Some(task) = self.attempt_task.take() {
            task.abort();
        }

        let close = (previous == ConnectionState::Open)
            .then(|| WsFrame::close(CLOSE_NORMAL, "client disconnect"));
        self.teardown_socket(close).await;

        self.settle_waiters(Err(ChatError::Cancelled(
            "disconnect() called before the connection opened".to_string(),
        )));
        self.set_state(ConnectionState::Disconnected);

        if previous == ConnectionState::Open {
            info!(connection = %self.connection_label(), "websocket closed by client");
            self.events
                .emit_disconnected(&DisconnectReason::local("client disconnect"));
        } else {
            debug!(
                connection = %self.connection_label(),
                previous = %previous,
                "disconnect requested"
            );
        }
        Ok(())
    }
}

impl<T, P, R> KameoMessage<SendChat> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ChatResult<String>;

    async fn handle(&mut self, msg: SendChat, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.state != ConnectionState::Open {
            return Err(ChatError::NotConnected { state: self.state });
        }
        let Some(writer) = self.writer_ref.as_ref() else {
            return Err(ChatError::NotConnected { state: self.state });
        };

        let chat = OutboundChat::new(msg.text, self.profile.as_ref(), Utc::now());
        let id = chat.id().to_string();
        let frame = OutboundEnvelope::ChatSend(chat).encode()?;
        write_bounded(writer, frame, "chat_send", WRITER_WRITE_TIMEOUT).await?;
        debug!(connection = %self.connection_label(), message_id = %id, "chat message sent");
        Ok(id)
    }
}

impl<T, P, R> KameoMessage<GetProfile> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ChatResult<Option<Profile>>;

    async fn handle(&mut self, _msg: GetProfile, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        Ok(self.profile.clone())
    }
}

impl<T, P, R> KameoMessage<GetState> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ChatResult<ConnectionState>;

    async fn handle(&mut self, _msg: GetState, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        Ok(self.state)
    }
}

// ---------------------------------------------------------------------------
// Internal messages (sent by spawned tasks)
// ---------------------------------------------------------------------------

pub(crate) struct ProfileResolved {
    generation: u64,
    result: ChatResult<Profile>,
}

pub(crate) struct ConnectionEstablished<T: WsTransport> {
    generation: u64,
    reader: T::Reader,
    writer: T::Writer,
}

pub(crate) struct ConnectionFailed {
    generation: u64,
    error: ChatError,
}

pub(crate) struct InboundFrame {
    generation: u64,
    frame: WsFrame,
}

pub(crate) struct SocketClosed {
    generation: u64,
    reason: DisconnectReason,
    error: Option<ChatError>,
}

pub(crate) struct HeartbeatTick {
    generation: u64,
}

pub(crate) struct ReconnectDue {
    epoch: u64,
}

impl<T, P, R> KameoMessage<ProfileResolved> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ProfileResolved,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.generation, ConnectionState::Authenticating) {
            debug!(generation = msg.generation, "dropping stale profile result");
            return;
        }
        match msg.result {
            Ok(profile) => self.open_transport(profile),
            Err(err) => self.fail_attempt(err),
        }
    }
}

impl<T, P, R> KameoMessage<ConnectionEstablished<T>> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionEstablished<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.generation, ConnectionState::Connecting) {
            debug!(generation = msg.generation, "closing socket from superseded attempt");
            let mut writer = msg.writer;
            tokio::spawn(async move {
                let _ = writer.close().await;
            });
            return;
        }
        self.on_connection_established(msg.reader, msg.writer).await;
    }
}

impl<T, P, R> KameoMessage<ConnectionFailed> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionFailed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if !self.is_current(msg.generation, ConnectionState::Connecting) {
            return;
        }
        self.fail_attempt(msg.error);
    }
}

impl<T, P, R> KameoMessage<InboundFrame> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: InboundFrame, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if !self.is_current(msg.generation, ConnectionState::Open) {
            return;
        }
        match decode_inbound(&msg.frame) {
            Ok(Some(message)) => self.events.emit_message(&message),
            Ok(None) => {}
            Err(err) => {
                // Isolated to this frame; the connection is unaffected.
                warn!(
                    connection = %self.connection_label(),
                    error = %err,
                    "dropping undecodable inbound frame"
                );
            }
        }
    }
}

impl<T, P, R> KameoMessage<SocketClosed> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: SocketClosed, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if !self.is_current(msg.generation, ConnectionState::Open) {
            return;
        }
        warn!(
            connection = %self.connection_label(),
            reason = %msg.reason,
            error = ?msg.error,
            "websocket dropped"
        );
        self.teardown_socket(None).await;
        self.set_state(ConnectionState::Disconnected);
        if let Some(err) = msg.error.as_ref() {
            self.events.emit_error(err);
        }
        self.events.emit_disconnected(&msg.reason);
        self.recovering = true;
        self.schedule_reconnect("socket_closed", &msg.reason.message);
    }
}

impl<T, P, R> KameoMessage<HeartbeatTick> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: HeartbeatTick, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if !self.is_current(msg.generation, ConnectionState::Open) {
            return;
        }
        let frame = match self.heartbeat.create_beat() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "failed to build heartbeat");
                return;
            }
        };
        debug!(
            connection = %self.connection_label(),
            sent = self.heartbeat.sent(),
            "sending heartbeat"
        );
        if let Err(err) = self.write_frame(frame).await {
            // The reader reports the drop; nothing else to do here.
            warn!(connection = %self.connection_label(), error = %err, "heartbeat send failed");
        }
    }
}

impl<T, P, R> KameoMessage<ReconnectDue> for ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: ReconnectDue, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if msg.epoch != self.reconnect_epoch {
            return;
        }
        self.reconnect_task = None;
        if self.state != ConnectionState::Disconnected {
            return;
        }
        info!(
            connection = %self.connection_label(),
            attempt = self.reconnect_attempt,
            "attempting reconnect"
        );
        self.begin_attempt(AttemptOrigin::Reconnect);
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl<T, P, R> ChatConnectionActor<T, P, R>
where
    T: WsTransport,
    P: ProfileResolver,
    R: WsReconnectStrategy,
{
    fn connection_label(&self) -> &str {
        &self.config.ws_url
    }

    fn is_current(&self, generation: u64, expected: ConnectionState) -> bool {
        generation == self.generation && self.state == expected
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(
                connection = %self.connection_label(),
                from = %self.state,
                to = %state,
                generation = self.generation,
                "connection state"
            );
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn settle_waiters(&mut self, result: ChatResult<()>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    fn begin_attempt(&mut self, origin: AttemptOrigin) {
        self.generation = self.generation.wrapping_add(1);
        self.origin = origin;
        self.set_state(ConnectionState::Authenticating);

        let generation = self.generation;
        let actor_ref = self.actor_ref.clone();
        let resolve = self.resolver.resolve(&self.credential);
        self.attempt_task = Some(tokio::spawn(async move {
            let result = resolve.await;
            let _ = actor_ref
                .tell(ProfileResolved { generation, result })
                .send()
                .await;
        }));
    }

    fn open_transport(&mut self, profile: Profile) {
        self.profile = Some(profile);
        self.set_state(ConnectionState::Connecting);

        let handshake = match self.handshake() {
            Ok(handshake) => handshake,
            Err(err) => {
                self.fail_attempt(err);
                return;
            }
        };

        let generation = self.generation;
        let actor_ref = self.actor_ref.clone();
        let transport = self.transport.clone();
        let timeout = self.config.connect_timeout;
        self.attempt_task = Some(tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, transport.connect(handshake)).await;
            match outcome {
                Ok(Ok((reader, writer))) => {
                    let _ = actor_ref
                        .tell(ConnectionEstablished::<T> {
                            generation,
                            reader,
                            writer,
                        })
                        .send()
                        .await;
                }
                Ok(Err(error)) => {
                    let _ = actor_ref
                        .tell(ConnectionFailed { generation, error })
                        .send()
                        .await;
                }
                Err(_) => {
                    let error = ChatError::network(
                        "connect_timeout",
                        format!("handshake did not complete within {timeout:?}"),
                    );
                    let _ = actor_ref
                        .tell(ConnectionFailed { generation, error })
                        .send()
                        .await;
                }
            }
        }));
    }

    fn handshake(&self) -> ChatResult<WsHandshake> {
        let url = self.config.socket_url(self.credential.expose())?;
        let mut headers = self.config.identity_headers();
        headers.push((TOKEN_HEADER.to_string(), self.credential.expose().to_string()));
        Ok(WsHandshake {
            url,
            headers,
            buffers: self.config.ws_buffers,
            tcp_nodelay: self.config.tcp_nodelay,
        })
    }

    fn fail_attempt(&mut self, err: ChatError) {
        warn!(
            connection = %self.connection_label(),
            origin = ?self.origin,
            kind = ?err.kind(),
            error = %err,
            "connect attempt failed"
        );
        self.attempt_task = None;
        self.set_state(ConnectionState::Disconnected);
        self.events.emit_error(&err);
        self.settle_waiters(Err(err.clone()));
        if self.origin == AttemptOrigin::Reconnect {
            self.schedule_reconnect("reconnect_failed", &err.to_string());
        }
    }

    async fn on_connection_established(&mut self, reader: T::Reader, writer: T::Writer) {
        self.attempt_task = None;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let writer = WsWriterActor::spawn(WsWriterActor::new(writer));
        self.writer_ref = Some(writer);
        self.shutdown_tx = Some(shutdown_tx);

        let activate = match OutboundEnvelope::Activate.encode() {
            Ok(frame) => frame,
            Err(err) => {
                self.teardown_socket(None).await;
                self.fail_attempt(err);
                return;
            }
        };
        if let Err(err) = self.write_frame(activate).await {
            self.teardown_socket(None).await;
            self.fail_attempt(err);
            return;
        }

        self.start_reader(reader, shutdown_rx.clone());
        self.heartbeat.reset();
        self.start_heartbeat(shutdown_rx);
        self.reconnect.reset();
        self.reconnect_attempt = 0;
        self.recovering = false;

        self.set_state(ConnectionState::Open);
        info!(
            connection = %self.connection_label(),
            generation = self.generation,
            origin = ?self.origin,
            "websocket connection established"
        );
        self.events.emit_connected();
        self.settle_waiters(Ok(()));
    }

    fn start_reader(&mut self, mut reader: T::Reader, mut shutdown_rx: watch::Receiver<bool>) {
        let generation = self.generation;
        let actor_ref = self.actor_ref.clone();
        let label = self.connection_label().to_string();

        self.reader_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = shutdown_rx.changed() => {
                        if res.is_err() || *shutdown_rx.borrow_and_update() { break; }
                    }
                    next = reader.next() => {
                        let closed = match next {
                            Some(Ok(WsFrame::Close(frame))) => {
                                info!(connection = %label, close = ?frame, "received websocket close frame");
                                let code = frame.as_ref().map(|f| f.code);
                                Some(SocketClosed {
                                    generation,
                                    reason: DisconnectReason::remote(describe_close(frame.as_ref()), code),
                                    error: None,
                                })
                            }
                            Some(Ok(frame)) if frame.is_data() => {
                                if actor_ref.tell(InboundFrame { generation, frame }).send().await.is_err() {
                                    break;
                                }
                                None
                            }
                            // Pings are answered by the transport.
                            Some(Ok(_)) => None,
                            Some(Err(err)) => Some(SocketClosed {
                                generation,
                                reason: DisconnectReason::remote(format!("read error: {err}"), None),
                                error: Some(err),
                            }),
                            None => Some(SocketClosed {
                                generation,
                                reason: DisconnectReason::remote("stream ended", None),
                                error: None,
                            }),
                        };
                        if let Some(closed) = closed {
                            let _ = actor_ref.tell(closed).send().await;
                            break;
                        }
                    }
                }
            }
        }));
    }

    fn start_heartbeat(&mut self, mut shutdown_rx: watch::Receiver<bool>) {
        if let Some(handle) = self.heartbeat_task.take() {
            handle.abort();
        }

        let generation = self.generation;
        let actor_ref = self.actor_ref.clone();
        let period = self.heartbeat.interval();

        self.heartbeat_task = Some(tokio::spawn(async move {
            // First beat one full period after open; the activation frame goes first.
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    res = shutdown_rx.changed() => {
                        if res.is_err() || *shutdown_rx.borrow_and_update() { break; }
                    }
                    _ = ticker.tick() => {
                        if actor_ref.tell(HeartbeatTick { generation }).send().await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    async fn write_frame(&self, frame: WsFrame) -> ChatResult<()> {
        let Some(writer) = self.writer_ref.as_ref() else {
            return Err(ChatError::NotConnected { state: self.state });
        };
        write_bounded(writer, frame, "write", WRITER_WRITE_TIMEOUT).await
    }

    /// Stop the per-socket tasks and the writer. `close` is flushed first when given.
    async fn teardown_socket(&mut self, close: Option<WsFrame>) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.heartbeat_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.reader_task.take() {
            handle.abort();
        }
        if let Some(writer) = self.writer_ref.take() {
            if let Some(frame) = close {
                if let Err(err) = write_bounded(&writer, frame, "close", WRITER_STOP_GRACE).await {
                    debug!(error = %err, "close frame not sent");
                }
            }
            let _ = writer.stop_gracefully().await;
            if tokio::time::timeout(WRITER_STOP_GRACE, writer.wait_for_shutdown())
                .await
                .is_err()
            {
                warn!(connection = %self.connection_label(), "writer did not stop in time; killing");
                writer.kill();
            }
        }
        self.heartbeat.reset();
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect_epoch = self.reconnect_epoch.wrapping_add(1);
        if let Some(handle) = self.reconnect_task.take() {
            handle.abort();
            debug!(connection = %self.connection_label(), "pending reconnect cancelled");
        }
    }

    fn schedule_reconnect(&mut self, event: &str, reason: &str) {
        if self.reconnect_task.is_some() {
            debug!(connection = %self.connection_label(), event, "reconnect already pending");
            return;
        }
        if !self.reconnect.should_retry() {
            self.log_reconnect_plan(event, "retry_suppressed", reason, None);
            return;
        }

        let delay = self.reconnect.next_delay();
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.reconnect_epoch = self.reconnect_epoch.wrapping_add(1);
        self.log_reconnect_plan(event, "scheduled", reason, Some(delay));

        let epoch = self.reconnect_epoch;
        let actor_ref = self.actor_ref.clone();
        self.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = actor_ref.tell(ReconnectDue { epoch }).send().await;
        }));
    }

    fn log_reconnect_plan(&self, event: &str, note: &str, reason: &str, delay: Option<Duration>) {
        let delay_ms = delay.map(|d| d.as_millis().min(u64::MAX as u128) as u64);
        if note == "retry_suppressed" {
            debug!(
                connection = %self.connection_label(),
                event = %event,
                note = %note,
                reason = %reason,
                attempt = self.reconnect_attempt,
                "websocket reconnect plan"
            );
        } else {
            warn!(
                connection = %self.connection_label(),
                event = %event,
                note = %note,
                reason = %reason,
                attempt = self.reconnect_attempt,
                delay_ms,
                "websocket reconnect plan"
            );
        }
    }
}

async fn write_bounded<W>(
    writer: &ActorRef<WsWriterActor<W>>,
    frame: WsFrame,
    context: &'static str,
    limit: Duration,
) -> ChatResult<()>
where
    W: futures_util::Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    let ask = async { writer.ask(WriterWrite { frame }).await };
    match tokio::time::timeout(limit, ask).await {
        Ok(result) => result.map_err(|err| writer_send_error(context, err)),
        Err(_) => Err(ChatError::transport(
            context,
            format!("write did not complete within {limit:?}"),
        )),
    }
}

/// Map a failed `ask` to the writer onto the client error surface.
fn writer_send_error<M>(context: &'static str, err: SendError<M, ChatError>) -> ChatError {
    match err {
        SendError::HandlerError(err) => err,
        SendError::ActorNotRunning(_) | SendError::ActorStopped => {
            ChatError::transport(context, "writer stopped")
        }
        SendError::MailboxFull(_) => ChatError::transport(context, "writer mailbox full"),
        _ => ChatError::transport(context, "writer unavailable"),
    }
}
