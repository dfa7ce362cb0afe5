//! Unified error type for relaychat.

use relaychat_protocol::ProtocolError;
use relaychat_session::SessionError;
use relaychat_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `relaychat` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (illegal state, name taken, unknown user).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Local I/O outside a connection, such as reading the terminal.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
