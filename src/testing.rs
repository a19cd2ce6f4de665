//! Reusable test utilities for exercising the connection actor without a real socket
//! or HTTP server.
//!
//! [`MockTransport::channel_pair`] yields a transport for the actor and a [`MockServer`]
//! handle. Every successful handshake hands the server a [`MockConnection`] through
//! [`MockServer::accept`]; tests use it to read outbound frames, push inbound frames, or
//! drop the socket.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Sink, Stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::api::{Credential, ProfileFuture, ProfileResolver};
use crate::core::{ChatError, ChatResult, WsFrame};
use crate::protocol::Profile;
use crate::transport::{WsHandshake, WsTransport, WsTransportConnectFuture};

struct TransportShared {
    accept_tx: mpsc::UnboundedSender<MockConnection>,
    fail_next: AtomicUsize,
    connects: AtomicUsize,
    handshakes: Mutex<Vec<WsHandshake>>,
    connect_delay: Mutex<Option<Duration>>,
}

/// In-memory transport. Supports any number of sequential connections.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<TransportShared>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(TransportShared {
            accept_tx,
            fail_next: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            handshakes: Mutex::new(Vec::new()),
            connect_delay: Mutex::new(None),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockServer { accept_rx, shared },
        )
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(&self, handshake: WsHandshake) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            shared.connects.fetch_add(1, Ordering::SeqCst);
            shared.handshakes.lock().push(handshake);

            let delay = *shared.connect_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let refused = shared
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ChatError::network("mock_connect", "connection refused"));
            }

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let stalled = Arc::new(AtomicBool::new(false));
            shared
                .accept_tx
                .send(MockConnection {
                    outbound_rx,
                    inbound_tx: Some(inbound_tx),
                    stalled: Arc::clone(&stalled),
                })
                .map_err(|_| ChatError::network("mock_connect", "mock server dropped"))?;
            let writer = MockWriter {
                sent_tx: outbound_tx,
                stalled,
            };
            Ok((MockReader { rx: inbound_rx }, writer))
        })
    }
}

/// Error surface for operations on [`MockConnection`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The actor side is no longer receiving inbound frames.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock actor channel is closed"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Server-side handle paired with [`MockTransport`].
pub struct MockServer {
    accept_rx: mpsc::UnboundedReceiver<MockConnection>,
    shared: Arc<TransportShared>,
}

impl MockServer {
    /// Wait for the next successful handshake.
    pub async fn accept(&mut self) -> Option<MockConnection> {
        self.accept_rx.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockConnection> {
        tokio::time::timeout(timeout, self.accept_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Refuse the next `n` handshakes with a network error.
    pub fn fail_next_connects(&self, n: usize) {
        self.shared.fail_next.store(n, Ordering::SeqCst);
    }

    /// Hold every handshake for `delay` before completing it.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.shared.connect_delay.lock() = delay;
    }

    /// Handshakes attempted so far, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> Vec<WsHandshake> {
        self.shared.handshakes.lock().clone()
    }
}

/// One accepted socket, seen from the server.
pub struct MockConnection {
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<ChatResult<WsFrame>>>,
    stalled: Arc<AtomicBool>,
}

impl MockConnection {
    /// Receive a frame written by the client.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// A frame already written, if any.
    pub fn try_recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.try_recv().ok()
    }

    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(Ok(frame)).map_err(|_| MockServerError::ChannelClosed)
    }

    /// Push a UTF-8 payload as websocket text.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text(text.into()))
    }

    /// Send a close frame. The socket stays readable until dropped.
    pub fn send_close(&self, code: u16, reason: &'static str) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::close(code, reason))
    }

    /// Surface a read error on the client's socket.
    pub fn send_error(&self, error: ChatError) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(Err(error)).map_err(|_| MockServerError::ChannelClosed)
    }

    /// Simulate a server-side socket drop by ending the inbound stream.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }

    /// Make the client's writes hang, as a full TCP send buffer would. Reads still flow.
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<ChatResult<WsFrame>>,
}

impl Stream for MockReader {
    type Item = ChatResult<WsFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_recv(cx)
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
    stalled: Arc<AtomicBool>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = ChatError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.stalled.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .sent_tx
            .send(item)
            .map_err(|_| ChatError::transport("mock_transport_write", "mock outbound channel closed"))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

struct ResolverShared {
    outcome: Mutex<ChatResult<Profile>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

/// Profile resolver with a scripted outcome.
#[derive(Clone)]
pub struct StaticProfileResolver {
    shared: Arc<ResolverShared>,
}

impl StaticProfileResolver {
    fn with_outcome(outcome: ChatResult<Profile>) -> Self {
        Self {
            shared: Arc::new(ResolverShared {
                outcome: Mutex::new(outcome),
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn accepting(profile: Profile) -> Self {
        Self::with_outcome(Ok(profile))
    }

    /// Reject every credential the way the login endpoint does for `{code: 1}`.
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self::with_outcome(Err(ChatError::Auth {
            message: message.into(),
            code: Some(1),
        }))
    }

    /// Resolve only after `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.shared.delay.lock() = Some(delay);
        self
    }

    /// Replace the outcome for subsequent calls.
    pub fn set_outcome(&self, outcome: ChatResult<Profile>) {
        *self.shared.outcome.lock() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }
}

impl ProfileResolver for StaticProfileResolver {
    fn resolve(&self, _credential: &Credential) -> ProfileFuture {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            shared.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *shared.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            shared.outcome.lock().clone()
        })
    }
}

/// A representative logged-in profile.
pub fn sample_profile() -> Profile {
    Profile {
        id: "1001".to_string(),
        user_name: Some("tester".to_string()),
        user_avatar: Some("https://cdn.example.com/a.png".to_string()),
        user_role: Some("user".to_string()),
        points: 120,
        level: Some(3),
        title_id: Some("7".to_string()),
        ..Profile::default()
    }
}
