//! `RelayServer` builder and accept loop.
//!
//! This is the entry point for running a relay. It ties the layers
//! together: transport → protocol → session.

use std::sync::Arc;
use std::time::Duration;

use relaychat_protocol::DEFAULT_PORT;
use relaychat_session::{Registry, ServerSession};
use relaychat_transport::{
    DEFAULT_HANDSHAKE_TIMEOUT, Handshake, ShutdownHandle, Transport,
    TransportError, WebSocketTransport,
};
use tokio::sync::Semaphore;

use crate::RelayError;

/// Settings for a [`RelayServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on, as `host:port`.
    pub bind_addr: String,
    /// Most connections served at once. `None` means no limit; further
    /// clients then wait in the accept queue until a slot frees up.
    pub max_connections: Option<usize>,
    /// How long an accepted peer has to finish the WebSocket handshake
    /// before it is dropped.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,no_run
/// use relaychat::prelude::*;
///
/// # async fn start() -> Result<(), RelayError> {
/// let server = RelayServer::builder()
///     .bind("127.0.0.1:22243")
///     .max_connections(256)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RelayServerBuilder {
    config: ServerConfig,
}

impl RelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Listens on all interfaces at `port`.
    pub fn port(self, port: u16) -> Self {
        self.bind(&format!("0.0.0.0:{port}"))
    }

    /// Caps the number of connections served at once.
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.config.max_connections = Some(limit);
        self
    }

    /// Sets how long a new peer may take over its handshake.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener.
    ///
    /// # Errors
    /// Returns a transport error if the address cannot be bound.
    pub async fn build(self) -> Result<RelayServer, RelayError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_handshake_timeout(self.config.handshake_timeout);
        let limit = self
            .config
            .max_connections
            .map(|n| Arc::new(Semaphore::new(n)));

        Ok(RelayServer {
            transport,
            registry: Arc::new(Registry::new()),
            limit,
        })
    }
}

/// A bound relay. Call [`run()`](Self::run) to start serving.
pub struct RelayServer {
    transport: WebSocketTransport,
    registry: Arc<Registry>,
    limit: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Creates a new builder.
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry shared by every session of this server.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Returns a handle that stops the accept loop from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.transport.shutdown_handle()
    }

    /// Runs the accept loop.
    ///
    /// Every accepted connection is served by a [`ServerSession`] on its
    /// own task, which also runs the handshake, so a peer that never
    /// completes one holds up nobody but itself. Returns once the
    /// transport has been shut down; sessions already running are left to
    /// finish on their own.
    pub async fn run(mut self) -> Result<(), RelayError> {
        tracing::info!(addr = ?self.local_addr().ok(), "relay server running");

        while self.transport.is_available() {
            let permit = match &self.limit {
                Some(limit) => match Arc::clone(limit).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };

            match self.transport.accept().await {
                Ok(pending) => {
                    let registry = Arc::clone(&self.registry);
                    let conn_id = pending.id();
                    tracing::debug!(%conn_id, peer = %pending.peer_addr(), "peer accepted");
                    tokio::spawn(async move {
                        match pending.complete().await {
                            Ok(conn) => {
                                tracing::info!(%conn_id, peer = ?conn.peer_addr(), "client connected");
                                ServerSession::run(conn, registry).await;
                                tracing::info!(%conn_id, "client connection ended");
                            }
                            Err(e) => {
                                tracing::warn!(%conn_id, error = %e, "handshake failed");
                            }
                        }
                        drop(permit);
                    });
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        tracing::info!("relay server stopped");
        Ok(())
    }
}
