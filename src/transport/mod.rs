use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{ChatResult, WebSocketBufferConfig, WsFrame};

pub mod tungstenite;

pub use tungstenite::{
    TungsteniteReader, TungsteniteTransport, TungsteniteWriter, install_rustls_crypto_provider,
};

/// Future returned by [`WsTransport::connect`].
pub type WsTransportConnectFuture<R, W> = Pin<Box<dyn Future<Output = ChatResult<(R, W)>> + Send>>;

/// Everything a transport needs to open one socket.
#[derive(Clone, Debug)]
pub struct WsHandshake {
    /// Full socket URL, credential query included.
    pub url: String,
    /// Extra request headers sent with the upgrade request.
    pub headers: Vec<(String, String)>,
    pub buffers: WebSocketBufferConfig,
    pub tcp_nodelay: bool,
}

/// Transport boundary for websocket IO.
///
/// The IO loop lives outside kameo; the connection actor owns state and policy. Handshake
/// failures are reported as `ChatError::Network`, IO on an open socket as
/// `ChatError::Transport`.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = ChatResult<WsFrame>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = crate::core::ChatError> + Send + Sync + Unpin + 'static;

    fn connect(&self, handshake: WsHandshake) -> WsTransportConnectFuture<Self::Reader, Self::Writer>;
}
