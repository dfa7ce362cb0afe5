//! The client's end of a connection.
//!
//! [`ClientSession`] is both the dispatcher for frames coming from the
//! relay and the handle the application uses to make requests. Clones
//! share state, so one clone can be moved into the task running [`drive`]
//! while another stays with the application.
//!
//! Requests are checked against the local state before anything is sent;
//! an illegal request costs no traffic. Everything the relay says is
//! reported as [`ClientEvent`]s.
//!
//! [`drive`]: crate::drive

use std::sync::Arc;

use relaychat_protocol::{
    ConnectionState, Message, MessageKind, USER_ALL, USER_NONE,
};
use relaychat_transport::TransportError;
use tokio::sync::{Mutex, mpsc};

use crate::dispatch::{Dispatcher, Flow};
use crate::registry::Outbox;
use crate::SessionError;

/// Something the application should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// A message from the relay: chat, confirmations and errors alike.
    MessageReceived(Message),
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    username: String,
}

/// Client-side state machine. See the [module docs](self).
#[derive(Debug, Clone)]
pub struct ClientSession {
    inner: Arc<Mutex<Inner>>,
    outbox: Outbox,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientSession {
    /// Creates a session in state `NEW` that will register as `username`.
    ///
    /// Requests are queued on `outbox`; events go to `events`.
    pub fn new(
        username: impl Into<String>,
        outbox: Outbox,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::New,
                username: username.into(),
            })),
            outbox,
            events,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// The requested username, or the one the relay confirmed.
    pub async fn username(&self) -> String {
        self.inner.lock().await.username.clone()
    }

    /// Asks the relay to register this client. Only legal in `NEW`.
    ///
    /// # Errors
    /// [`SessionError::IllegalState`] outside `NEW`,
    /// [`SessionError::Protocol`] if the username contains a line break,
    /// or a transport error if the connection task has ended.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::New {
            return Err(SessionError::IllegalState {
                operation: "connect",
                state: inner.state,
            });
        }
        let request =
            Message::bare(inner.username.as_str(), USER_NONE, MessageKind::Connect);
        request.validate()?;
        self.send(request)?;
        self.transition(&mut inner, ConnectionState::ConfirmConnect);
        Ok(())
    }

    /// Changes the name the next [`connect`](Self::connect) asks for.
    /// Only legal in `NEW`, e.g. after the relay refused a name.
    pub async fn rename(
        &self,
        username: impl Into<String>,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::New {
            return Err(SessionError::IllegalState {
                operation: "connect",
                state: inner.state,
            });
        }
        inner.username = username.into();
        Ok(())
    }

    /// Asks the relay to end the session. Legal in `NEW` and `CONNECTED`.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !matches!(
            inner.state,
            ConnectionState::New | ConnectionState::Connected
        ) {
            return Err(SessionError::IllegalState {
                operation: "disconnect",
                state: inner.state,
            });
        }
        let request = Message::bare(
            inner.username.as_str(),
            USER_NONE,
            MessageKind::Disconnect,
        );
        request.validate()?;
        self.send(request)?;
        self.transition(&mut inner, ConnectionState::ConfirmDisconnect);
        Ok(())
    }

    /// Sends a chat message. A blank `receiver` means everyone.
    ///
    /// # Errors
    /// - [`SessionError::IllegalState`] unless `CONNECTED`
    /// - [`SessionError::EmptyMessage`] for an empty payload
    /// - [`SessionError::SelfMessage`] when addressed to our own name
    /// - [`SessionError::Protocol`] if a field contains a line break
    pub async fn send_message(
        &self,
        receiver: &str,
        payload: &str,
    ) -> Result<(), SessionError> {
        let inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(SessionError::IllegalState {
                operation: "message",
                state: inner.state,
            });
        }
        if payload.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let receiver = match receiver.trim() {
            "" => USER_ALL,
            name => name,
        };
        if receiver == inner.username {
            return Err(SessionError::SelfMessage);
        }

        let message = Message::new(
            inner.username.as_str(),
            receiver,
            MessageKind::Message,
            payload,
        );
        message.validate()?;
        self.send(message)
    }

    fn send(&self, message: Message) -> Result<(), SessionError> {
        self.outbox.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SessionError::Transport(TransportError::SendFailed(
                    std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        "outbox full",
                    ),
                ))
            }
            mpsc::error::TrySendError::Closed(_) => {
                SessionError::Transport(TransportError::ConnectionClosed(
                    "connection task ended".into(),
                ))
            }
        })
    }

    fn emit(&self, event: ClientEvent) {
        // The application may have stopped listening; that is its choice.
        let _ = self.events.send(event);
    }

    fn transition(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            tracing::debug!(username = %inner.username, from = %inner.state, to = %state, "state changed");
            inner.state = state;
            self.emit(ClientEvent::StateChanged(state));
        }
    }
}

impl Dispatcher for ClientSession {
    async fn on_connect(&mut self, message: Message) -> Result<Flow, SessionError> {
        tracing::warn!(%message, "illegal connect request from server");
        Ok(Flow::Continue)
    }

    async fn on_confirm(&mut self, message: Message) -> Result<Flow, SessionError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            ConnectionState::ConfirmConnect => {
                inner.username = message.receiver.clone();
                self.emit(ClientEvent::MessageReceived(message));
                self.transition(&mut inner, ConnectionState::Connected);
                Ok(Flow::Continue)
            }
            ConnectionState::ConfirmDisconnect => {
                self.transition(&mut inner, ConnectionState::Disconnected);
                Ok(Flow::Stop)
            }
            state => {
                tracing::warn!(%state, %message, "unexpected confirm");
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_disconnect(&mut self, message: Message) -> Result<Flow, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Disconnected {
            tracing::warn!(%message, "disconnect while already disconnected");
            return Ok(Flow::Continue);
        }
        self.emit(ClientEvent::MessageReceived(message));
        self.transition(&mut inner, ConnectionState::Disconnected);
        Ok(Flow::Stop)
    }

    async fn on_message(&mut self, message: Message) -> Result<Flow, SessionError> {
        let state = self.inner.lock().await.state;
        if state == ConnectionState::Connected {
            self.emit(ClientEvent::MessageReceived(message));
        } else {
            tracing::warn!(%state, %message, "message while not connected dropped");
        }
        Ok(Flow::Continue)
    }

    async fn on_error(&mut self, message: Message) -> Result<Flow, SessionError> {
        let mut inner = self.inner.lock().await;
        tracing::debug!(%message, "error from relay");
        self.emit(ClientEvent::MessageReceived(message));
        // A refused registration leaves the connection usable for a retry.
        if inner.state == ConnectionState::ConfirmConnect {
            self.transition(&mut inner, ConnectionState::New);
        }
        Ok(Flow::Continue)
    }

    async fn on_info(&mut self, message: Message) -> Result<Flow, SessionError> {
        self.emit(ClientEvent::MessageReceived(message));
        Ok(Flow::Continue)
    }

    fn on_rejected(&mut self, error: SessionError, _addressee: Option<&str>) {
        tracing::warn!(error = %error, "bad frame from relay");
        if self.send(Message::error(USER_NONE, error.to_string())).is_err() {
            tracing::debug!("error report dropped, connection task ended");
        }
    }

    async fn on_closed(&mut self) {
        let mut inner = self.inner.lock().await;
        self.transition(&mut inner, ConnectionState::Disconnected);
    }
}
