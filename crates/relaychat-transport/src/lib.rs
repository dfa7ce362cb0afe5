//! Transport abstraction layer for relaychat.
//!
//! Provides the [`Transport`] and [`Connection`] traits the relay consumes.
//! A connection moves whole text frames: the chat protocol has no length
//! prefix of its own, so the transport is responsible for framing.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`,
//!   where one WebSocket text message carries exactly one frame.

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    ClientConnection, DEFAULT_HANDSHAKE_TIMEOUT, ShutdownHandle,
    WebSocketConnection, WebSocketHandshake, WebSocketTransport, connect,
};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted peer whose handshake has not run yet.
    type Handshake: Handshake<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for the next incoming peer.
    ///
    /// Only the raw accept happens here; the protocol handshake is left to
    /// [`Handshake::complete`] so a slow peer cannot hold up the accept
    /// loop. Fails with a shutdown error once the transport is shut down,
    /// including while already waiting.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Handshake, Self::Error>> + Send;

    /// Returns `false` once the transport has been shut down.
    fn is_available(&self) -> bool;
}

/// The second half of accepting a connection.
///
/// Meant to run on the connection's own task.
pub trait Handshake: Send + 'static {
    /// The connection produced once the handshake succeeds.
    type Connection: Connection;
    /// The error type for a failed handshake.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The id the connection will carry.
    fn id(&self) -> ConnectionId;

    /// Runs the handshake and yields the ready connection.
    fn complete(
        self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// A single connection that exchanges text frames with a remote peer.
///
/// All methods take `&self`: sending and receiving may happen concurrently
/// from different tasks.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one frame to the remote peer.
    fn send(
        &self,
        frame: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns `false` once the connection is closed from either side.
    fn is_available(&self) -> bool;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
