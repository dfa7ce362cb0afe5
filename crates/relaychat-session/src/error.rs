//! Error types for the session layer.

use relaychat_protocol::{ConnectionState, ProtocolError};
use relaychat_transport::TransportError;

/// Errors raised while driving a connection's state machine.
///
/// Everything except [`Transport`](Self::Transport) is recoverable: the
/// session reports it to the offending peer as an `ERROR` message and
/// carries on in its current state. The display text is that message's
/// payload.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation is not allowed in the connection's current state,
    /// e.g. sending a chat message before registering.
    #[error("Illegal state for {operation} request: {state}")]
    IllegalState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// Another connection is already registered under this name.
    #[error("User name already taken: {0}")]
    UsernameTaken(String),

    /// The name is reserved by the protocol (the broadcast sentinel).
    #[error("User name not allowed: {0}")]
    ReservedName(String),

    /// No connection is registered under the message's receiver.
    #[error("Unknown User: {0}")]
    UnknownReceiver(String),

    /// A client tried to message its own username.
    #[error("Can't send messages to yourself")]
    SelfMessage,

    /// A client tried to send a chat message without text.
    #[error("Message is empty.")]
    EmptyMessage,

    /// The frame could not be decoded or the message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection is gone.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
