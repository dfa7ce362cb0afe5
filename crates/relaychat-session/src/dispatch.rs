//! The receive loop shared by both ends of a connection.
//!
//! [`drive`] owns the socket side of a session: it reads frames, decodes
//! them, and hands each message to a [`Dispatcher`] by kind. Everything the
//! dispatcher wants written goes through the session's outbox, which the
//! same loop drains, so every frame a connection sends is written by one
//! task in queue order.
//!
//! ```text
//!              ┌──────────── outbox ◄── registry deliveries, replies
//!              ▼
//! conn.send ◄─ drive ─► conn.recv ─► codec.decode ─► Dispatcher::on_*
//! ```
//!
//! The relay side ([`ServerSession`](crate::ServerSession)) and the client
//! side ([`ClientSession`](crate::ClientSession)) differ only in their
//! dispatcher.

use std::future::Future;

use relaychat_protocol::{Codec, Message, MessageKind};
use relaychat_transport::{Connection, TransportError};
use tokio::sync::mpsc::Receiver;

use crate::SessionError;

/// Whether the receive loop keeps going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Flush the outbox, close the connection and return.
    Stop,
}

/// Per-kind message handlers for one end of a connection.
///
/// A handler returning `Err` does not end the session: the error is passed
/// to [`on_rejected`](Self::on_rejected) and the loop carries on. Only a
/// transport error or [`Flow::Stop`] ends it.
pub trait Dispatcher: Send {
    fn on_connect(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<Flow, SessionError>> + Send;

    fn on_confirm(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<Flow, SessionError>> + Send;

    fn on_disconnect(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<Flow, SessionError>> + Send;

    fn on_message(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<Flow, SessionError>> + Send;

    fn on_error(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<Flow, SessionError>> + Send;

    /// INFO is informational on both ends; the default just logs it.
    fn on_info(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<Flow, SessionError>> + Send {
        async move {
            tracing::info!(%message, "info received");
            Ok(Flow::Continue)
        }
    }

    /// Reports a recoverable failure to the peer.
    ///
    /// `addressee` is the name the failing frame claimed to come from, when
    /// it could be read; otherwise the session's own username applies.
    fn on_rejected(&mut self, error: SessionError, addressee: Option<&str>);

    /// Called once when the connection goes away without a [`Flow::Stop`].
    fn on_closed(&mut self) -> impl Future<Output = ()> + Send;
}

/// Runs one connection until it stops or closes.
///
/// Returns after either the dispatcher asked to stop (the outbox is flushed
/// and the connection closed) or the peer went away (the dispatcher's
/// [`on_closed`](Dispatcher::on_closed) has run).
pub async fn drive<C, K, D>(
    conn: &C,
    codec: &K,
    dispatcher: &mut D,
    outbox: &mut Receiver<Message>,
) where
    C: Connection<Error = TransportError>,
    K: Codec,
    D: Dispatcher,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "session started");

    loop {
        tokio::select! {
            Some(message) = outbox.recv() => {
                write(conn, codec, &message).await;
            }
            received = conn.recv() => match received {
                Ok(Some(frame)) => {
                    tracing::debug!(%conn_id, frame = %frame.escape_debug(), "frame received");
                    if handle_frame(codec, dispatcher, &frame).await == Flow::Stop {
                        while let Ok(message) = outbox.try_recv() {
                            write(conn, codec, &message).await;
                        }
                        if let Err(e) = conn.close().await {
                            tracing::debug!(%conn_id, error = %e, "close failed");
                        }
                        tracing::debug!(%conn_id, "session stopped");
                        return;
                    }
                }
                Ok(None) => {
                    tracing::debug!(%conn_id, "connection closed by peer");
                    dispatcher.on_closed().await;
                    return;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "receive failed");
                    dispatcher.on_closed().await;
                    return;
                }
            },
        }
    }
}

/// Decodes one frame and dispatches it by kind.
async fn handle_frame<K, D>(codec: &K, dispatcher: &mut D, frame: &str) -> Flow
where
    K: Codec,
    D: Dispatcher,
{
    let message = match codec.decode(frame) {
        Ok(message) => message,
        Err(e) => {
            let addressee = frame
                .split('\n')
                .next()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty());
            dispatcher.on_rejected(e.into(), addressee);
            return Flow::Continue;
        }
    };

    let result = match message.kind {
        MessageKind::Connect => dispatcher.on_connect(message).await,
        MessageKind::Confirm => dispatcher.on_confirm(message).await,
        MessageKind::Disconnect => dispatcher.on_disconnect(message).await,
        MessageKind::Message => dispatcher.on_message(message).await,
        MessageKind::Error => dispatcher.on_error(message).await,
        MessageKind::Info => dispatcher.on_info(message).await,
    };

    match result {
        Ok(flow) => flow,
        Err(SessionError::Transport(e)) => {
            tracing::debug!(error = %e, "outbox closed, stopping");
            Flow::Stop
        }
        Err(e) => {
            dispatcher.on_rejected(e, None);
            Flow::Continue
        }
    }
}

/// Encodes and sends one outbound message. Failures drop the message.
async fn write<C, K>(conn: &C, codec: &K, message: &Message)
where
    C: Connection<Error = TransportError>,
    K: Codec,
{
    let frame = match codec.encode(message) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(conn_id = %conn.id(), %message, error = %e, "unencodable message dropped");
            return;
        }
    };
    if let Err(e) = conn.send(&frame).await {
        tracing::warn!(conn_id = %conn.id(), %message, error = %e, "send failed, message dropped");
    }
}
