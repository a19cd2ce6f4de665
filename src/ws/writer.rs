use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tracing::debug;

use crate::core::{ChatError, ChatResult, WsFrame};

/// Writer actor that owns the transport writer and serializes writes.
///
/// One writer exists per socket; its mailbox is the single outbound channel, so
/// activation, heartbeats and chat sends never interleave on the wire.
pub struct WsWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    writer: W,
    frames_sent: u64,
}

impl<W> WsWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_sent: 0,
        }
    }
}

impl<W> Actor for WsWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    type Args = Self;
    type Error = ChatError;

    fn name() -> &'static str {
        "WsWriterActor"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    async fn on_stop(
        &mut self,
        _ctx: kameo::actor::WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> Result<(), Self::Error> {
        // Best effort; the peer may already be gone.
        let _ = self.writer.close().await;
        debug!(target: "ws-writer", frames_sent = self.frames_sent, "writer stopped");
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
            tracing::error!(error = ?err, "WsWriterActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Write one frame and flush it.
#[derive(Clone, Debug)]
pub struct WriterWrite {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriterWrite> for WsWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        msg: WriterWrite,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        debug!(target: "ws-writer", "sending websocket frame to wire");
        self.writer.send(msg.frame).await?;
        self.frames_sent = self.frames_sent.saturating_add(1);
        Ok(())
    }
}
