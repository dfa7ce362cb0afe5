//! # relaychat
//!
//! A multi-user chat relay. Clients connect over WebSocket, register a
//! unique username, and exchange text messages addressed to one user or
//! broadcast to all; the relay owns the username registry and routes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaychat::prelude::*;
//!
//! # async fn start() -> Result<(), RelayError> {
//! let server = RelayServer::builder().port(DEFAULT_PORT).build().await?;
//! let shutdown = server.shutdown_handle();
//! tokio::spawn(server.run());
//!
//! let (client, mut events) = ChatClient::connect("127.0.0.1", DEFAULT_PORT, "alice").await?;
//! while let Some(event) = events.recv().await {
//!     if event == ClientEvent::StateChanged(ConnectionState::Connected) {
//!         client.send_message("*", "hello everyone").await?;
//!         break;
//!     }
//! }
//! shutdown.shutdown();
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod server;

pub use client::ChatClient;
pub use error::RelayError;
pub use server::{RelayServer, RelayServerBuilder, ServerConfig};

/// Everything needed to run a relay or talk to one.
pub mod prelude {
    pub use crate::{
        ChatClient, RelayError, RelayServer, RelayServerBuilder, ServerConfig,
    };
    pub use relaychat_protocol::{
        Codec, ConnectionState, DEFAULT_PORT, LineCodec, Message, MessageKind,
        ProtocolError, USER_ALL, USER_NONE,
    };
    pub use relaychat_session::{ClientEvent, Registry, SessionError};
    pub use relaychat_transport::{ShutdownHandle, TransportError};
}
