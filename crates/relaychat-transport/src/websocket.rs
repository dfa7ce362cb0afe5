//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Handshake, Transport, TransportError};

/// How long an accepted peer gets to finish the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The connection type returned by [`connect`].
pub type ClientConnection = WebSocketConnection<MaybeTlsStream<TcpStream>>;

fn io_error<E>(kind: std::io::ErrorKind, err: E) -> std::io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    std::io::Error::new(kind, err)
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Connection ids are numbered per transport instance, starting at 1.
pub struct WebSocketTransport {
    listener: TcpListener,
    last_id: u64,
    handshake_timeout: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let (shutdown, _) = watch::channel(false);
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            last_id: 0,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Sets how long a peer may take to complete its handshake.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a handle that can stop this transport from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Handshake = WebSocketHandshake;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Handshake, Self::Error> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(TransportError::Shutdown);
        }

        let (stream, addr) = tokio::select! {
            accepted = self.listener.accept() => {
                accepted.map_err(TransportError::AcceptFailed)?
            }
            _ = shutdown.wait_for(|closed| *closed) => {
                return Err(TransportError::Shutdown);
            }
        };

        self.last_id += 1;
        let id = ConnectionId::new(self.last_id);
        tracing::debug!(%id, %addr, "accepted TCP connection");

        Ok(WebSocketHandshake {
            id,
            stream,
            addr,
            timeout: self.handshake_timeout,
        })
    }

    fn is_available(&self) -> bool {
        !*self.shutdown.borrow()
    }
}

/// An accepted TCP peer that has not upgraded to WebSocket yet.
#[derive(Debug)]
pub struct WebSocketHandshake {
    id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    timeout: Duration,
}

impl WebSocketHandshake {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Handshake for WebSocketHandshake {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn complete(self) -> Result<Self::Connection, Self::Error> {
        let upgrade = tokio_tungstenite::accept_async(self.stream);
        let ws = match tokio::time::timeout(self.timeout, upgrade).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                return Err(TransportError::HandshakeFailed(io_error(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                )));
            }
            Err(_) => {
                return Err(TransportError::HandshakeFailed(io_error(
                    std::io::ErrorKind::TimedOut,
                    format!("no handshake from {} within {:?}", self.addr, self.timeout),
                )));
            }
        };
        tracing::debug!(id = %self.id, addr = %self.addr, "WebSocket handshake complete");
        Ok(WebSocketConnection::new(self.id, ws, Some(self.addr)))
    }
}

/// Stops a [`WebSocketTransport`] from outside its accept loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Makes the transport unavailable and wakes a pending `accept`.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
        tracing::info!("transport shutdown requested");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Opens a client connection to a relay listening at `addr` (`host:port`).
///
/// Client-side connections are not numbered; their id is always 0.
pub async fn connect(addr: &str) -> Result<ClientConnection, TransportError> {
    let url = format!("ws://{addr}");
    let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
        TransportError::ConnectFailed {
            addr: addr.to_owned(),
            source: io_error(std::io::ErrorKind::ConnectionRefused, e),
        }
    })?;
    tracing::debug!(addr, "opened WebSocket connection");
    Ok(WebSocketConnection::new(ConnectionId::new(0), ws, None))
}

/// A single WebSocket connection.
///
/// The socket is split into independently locked halves so one task can
/// wait in [`recv`](Connection::recv) while another sends.
pub struct WebSocketConnection<S = TcpStream> {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    open: AtomicBool,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(
        id: ConnectionId,
        ws: WebSocketStream<S>,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id,
            peer_addr,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            open: AtomicBool::new(true),
        }
    }

    /// Returns the remote address for accepted connections.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, frame: &str) -> Result<(), Self::Error> {
        if !self.is_available() {
            return Err(TransportError::ConnectionClosed(format!(
                "{} is closed",
                self.id
            )));
        }
        let msg = Message::text(frame.to_owned());
        let result = self.sink.lock().await.send(msg).await;
        result.map_err(|e| {
            self.mark_closed();
            TransportError::SendFailed(io_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<String>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return match std::str::from_utf8(&data) {
                        Ok(text) => Ok(Some(text.to_owned())),
                        Err(e) => Err(TransportError::ReceiveFailed(io_error(
                            std::io::ErrorKind::InvalidData,
                            e,
                        ))),
                    };
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.mark_closed();
                    return Ok(None);
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.mark_closed();
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(io_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn is_available(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
