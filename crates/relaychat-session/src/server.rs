//! The relay's end of a connection.

use std::sync::Arc;

use relaychat_protocol::{
    ConnectionState, LineCodec, Message, USER_ALL, anonymous_name,
};
use relaychat_transport::{Connection, ConnectionId, TransportError};
use crate::dispatch::{Dispatcher, Flow, drive};
use crate::registry::{Outbox, outbox};
use crate::{Registry, SessionError, SessionHandle};

/// State machine for one connected client, as seen by the relay.
///
/// Starts `NEW` under the placeholder name `Anonymous-<id>`, becomes
/// `CONNECTED` once a CONNECT registers a name, and ends `DISCONNECTED`
/// on a DISCONNECT or when the connection drops. The registry entry exists
/// exactly while the session is `CONNECTED`.
pub struct ServerSession {
    username: String,
    state: ConnectionState,
    registry: Arc<Registry>,
    handle: SessionHandle,
}

impl ServerSession {
    /// Creates a session whose replies are queued on `outbox`.
    pub fn new(
        id: ConnectionId,
        registry: Arc<Registry>,
        outbox: Outbox,
    ) -> Self {
        Self {
            username: anonymous_name(id.into_inner()),
            state: ConnectionState::New,
            registry,
            handle: SessionHandle::new(id, outbox),
        }
    }

    /// Serves `conn` until the client disconnects or the connection drops.
    pub async fn run<C>(conn: C, registry: Arc<Registry>)
    where
        C: Connection<Error = TransportError>,
    {
        let (tx, mut rx) = outbox();
        let mut session = ServerSession::new(conn.id(), registry, tx);
        drive(&conn, &LineCodec, &mut session, &mut rx).await;
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn reply(&self, message: Message) {
        self.handle.deliver(message);
    }
}

impl Dispatcher for ServerSession {
    async fn on_connect(&mut self, message: Message) -> Result<Flow, SessionError> {
        if self.state != ConnectionState::New {
            return Err(SessionError::IllegalState {
                operation: "connect",
                state: self.state,
            });
        }

        let requested = if message.sender.trim().is_empty() {
            self.username.clone()
        } else {
            message.sender
        };
        if requested == USER_ALL {
            return Err(SessionError::ReservedName(requested));
        }

        self.registry
            .register(&requested, self.handle.clone())
            .await?;
        self.username = requested;
        self.state = ConnectionState::Connected;
        tracing::info!(conn_id = %self.id(), username = %self.username, "user registered");

        self.reply(Message::registration_confirm(&self.username));
        Ok(Flow::Continue)
    }

    async fn on_confirm(&mut self, message: Message) -> Result<Flow, SessionError> {
        tracing::debug!(conn_id = %self.id(), %message, "confirm from client ignored");
        Ok(Flow::Continue)
    }

    async fn on_disconnect(&mut self, _message: Message) -> Result<Flow, SessionError> {
        match self.state {
            ConnectionState::Disconnected => Err(SessionError::IllegalState {
                operation: "disconnect",
                state: self.state,
            }),
            state => {
                if state == ConnectionState::Connected {
                    self.registry.unregister(&self.username).await;
                }
                self.state = ConnectionState::Disconnected;
                tracing::info!(conn_id = %self.id(), username = %self.username, "user disconnected");
                self.reply(Message::disconnect_confirm(&self.username));
                Ok(Flow::Stop)
            }
        }
    }

    async fn on_message(&mut self, message: Message) -> Result<Flow, SessionError> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::IllegalState {
                operation: "message",
                state: self.state,
            });
        }

        if message.is_broadcast() {
            let delivered = self.registry.broadcast(&message).await;
            tracing::debug!(conn_id = %self.id(), delivered, "broadcast routed");
        } else {
            self.registry.unicast(message.clone()).await?;
            self.reply(message);
        }
        Ok(Flow::Continue)
    }

    async fn on_error(&mut self, message: Message) -> Result<Flow, SessionError> {
        tracing::warn!(conn_id = %self.id(), %message, "error reported by client");
        Ok(Flow::Continue)
    }

    fn on_rejected(&mut self, error: SessionError, addressee: Option<&str>) {
        tracing::debug!(conn_id = %self.id(), username = %self.username, error = %error, "request rejected");
        let receiver = addressee.unwrap_or(&self.username);
        self.reply(Message::error(receiver, error.to_string()));
    }

    async fn on_closed(&mut self) {
        if self.state == ConnectionState::Connected {
            self.registry.unregister(&self.username).await;
            tracing::info!(conn_id = %self.id(), username = %self.username, "connection lost");
        }
        self.state = ConnectionState::Disconnected;
    }
}
