//! Integration tests for the receive loop, using an in-memory connection.
//!
//! `MockConnection` is a pair of channels: the test pushes inbound frames
//! and reads back whatever the session wrote.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use relaychat_protocol::{Codec, ConnectionState, LineCodec, Message, MessageKind};
use relaychat_session::{
    ClientEvent, ClientSession, Registry, ServerSession, drive, outbox,
};
use relaychat_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::{Mutex, mpsc};

struct MockConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
    outbound: mpsc::UnboundedSender<String>,
    open: AtomicBool,
}

/// The test's side of a [`MockConnection`].
struct Peer {
    to_session: mpsc::UnboundedSender<String>,
    from_session: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    fn send(&self, frame: &str) {
        self.to_session.send(frame.to_owned()).unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.from_session.recv())
            .await
            .expect("timed out waiting for a frame")
    }
}

fn mock(id: u64) -> (MockConnection, Peer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let conn = MockConnection {
        id: ConnectionId::new(id),
        inbound: Mutex::new(in_rx),
        outbound: out_tx,
        open: AtomicBool::new(true),
    };
    let peer = Peer {
        to_session: in_tx,
        from_session: out_rx,
    };
    (conn, peer)
}

impl Connection for MockConnection {
    type Error = TransportError;

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed("mock closed".into()));
        }
        self.outbound
            .send(frame.to_owned())
            .map_err(|_| TransportError::ConnectionClosed("peer gone".into()))
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

fn spawn_server(
    conn: MockConnection,
    registry: &Arc<Registry>,
) -> tokio::task::JoinHandle<MockConnection> {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let (tx, mut rx) = outbox();
        let mut session = ServerSession::new(conn.id(), registry, tx);
        drive(&conn, &LineCodec, &mut session, &mut rx).await;
        conn
    })
}

// =========================================================================
// Server role
// =========================================================================

#[tokio::test]
async fn test_server_drive_connect_then_message_round_trip() {
    let registry = Arc::new(Registry::new());
    let (alice_conn, mut alice) = mock(1);
    let (bob_conn, mut bob) = mock(2);
    spawn_server(alice_conn, &registry);
    spawn_server(bob_conn, &registry);

    alice.send("alice\n\nCONNECT");
    assert_eq!(
        alice.recv().await.unwrap(),
        "\nalice\nCONFIRM\nRegistration successful for alice"
    );
    bob.send("bob\n\nCONNECT");
    bob.recv().await.unwrap();

    alice.send("alice\nbob\nMESSAGE\nhi");

    assert_eq!(bob.recv().await.unwrap(), "alice\nbob\nMESSAGE\nhi");
    assert_eq!(alice.recv().await.unwrap(), "alice\nbob\nMESSAGE\nhi");
}

#[tokio::test]
async fn test_server_drive_decode_failure_replies_error_and_keeps_state() {
    let registry = Arc::new(Registry::new());
    let (conn, mut peer) = mock(1);
    spawn_server(conn, &registry);

    peer.send("alice\nbob");
    assert_eq!(peer.recv().await.unwrap(), "\nalice\nERROR\nNo kind found");

    peer.send("alice\nbob\nSHOUT\nhi");
    assert_eq!(peer.recv().await.unwrap(), "\nalice\nERROR\nInvalid type: SHOUT");

    // Still NEW: registration works afterwards.
    peer.send("alice\n\nCONNECT");
    assert_eq!(peer.recv().await.unwrap().split('\n').nth(2), Some("CONFIRM"));
    assert!(registry.contains("alice").await);
}

#[tokio::test]
async fn test_server_drive_empty_frame_errors_to_placeholder() {
    let registry = Arc::new(Registry::new());
    let (conn, mut peer) = mock(9);
    spawn_server(conn, &registry);

    peer.send("");

    assert_eq!(peer.recv().await.unwrap(), "\nAnonymous-9\nERROR\nNo sender found");
}

#[tokio::test]
async fn test_server_drive_disconnect_flushes_reply_then_closes() {
    let registry = Arc::new(Registry::new());
    let (conn, mut peer) = mock(1);
    let task = spawn_server(conn, &registry);

    peer.send("alice\n\nCONNECT");
    peer.recv().await.unwrap();
    peer.send("alice\n\nDISCONNECT");

    assert_eq!(
        peer.recv().await.unwrap(),
        "alice\n\nDISCONNECT\nUser alice has successfully disconnected"
    );
    let conn = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("session should end")
        .unwrap();
    assert!(!conn.is_available(), "connection should be closed");
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_server_drive_peer_close_unregisters() {
    let registry = Arc::new(Registry::new());
    let (conn, mut peer) = mock(1);
    let task = spawn_server(conn, &registry);

    peer.send("alice\n\nCONNECT");
    peer.recv().await.unwrap();
    assert!(registry.contains("alice").await);

    drop(peer.to_session);

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("session should end")
        .unwrap();
    assert!(!registry.contains("alice").await);
}

#[tokio::test]
async fn test_server_drive_message_to_departed_user_is_unknown() {
    let registry = Arc::new(Registry::new());
    let (alice_conn, mut alice) = mock(1);
    let (bob_conn, mut bob) = mock(2);
    let alice_task = spawn_server(alice_conn, &registry);
    spawn_server(bob_conn, &registry);

    alice.send("alice\n\nCONNECT");
    alice.recv().await.unwrap();
    bob.send("bob\n\nCONNECT");
    bob.recv().await.unwrap();

    alice.send("alice\n\nDISCONNECT");
    alice.recv().await.unwrap();
    alice_task.await.unwrap();

    bob.send("bob\nalice\nMESSAGE\nstill there?");
    assert_eq!(bob.recv().await.unwrap(), "\nbob\nERROR\nUnknown User: alice");
}

// =========================================================================
// Client role
// =========================================================================

#[tokio::test]
async fn test_client_drive_connect_confirm_and_disconnect() {
    let (conn, mut relay) = mock(0);
    let (out_tx, mut out_rx) = outbox();
    let (ev_tx, mut events) = mpsc::unbounded_channel();
    let client = ClientSession::new("alice", out_tx, ev_tx);

    let mut dispatcher = client.clone();
    let task = tokio::spawn(async move {
        drive(&conn, &LineCodec, &mut dispatcher, &mut out_rx).await;
    });

    client.connect().await.unwrap();
    assert_eq!(relay.recv().await.unwrap(), "alice\n\nCONNECT");

    relay.send("\nalice\nCONFIRM\nRegistration successful for alice");
    let mut saw_connected = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_secs(2), events.recv()).await
    {
        if event == ClientEvent::StateChanged(ConnectionState::Connected) {
            saw_connected = true;
            break;
        }
    }
    assert!(saw_connected);

    client.send_message("bob", "hi").await.unwrap();
    assert_eq!(relay.recv().await.unwrap(), "alice\nbob\nMESSAGE\nhi");

    client.disconnect().await.unwrap();
    assert_eq!(relay.recv().await.unwrap(), "alice\n\nDISCONNECT");
    relay.send("alice\n\nDISCONNECT\nUser alice has successfully disconnected");

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("client loop should stop")
        .unwrap();
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_client_drive_bad_frame_reports_error_to_relay() {
    let (conn, mut relay) = mock(0);
    let (out_tx, mut out_rx) = outbox();
    let (ev_tx, _events) = mpsc::unbounded_channel();
    let mut dispatcher = ClientSession::new("alice", out_tx, ev_tx);
    tokio::spawn(async move {
        drive(&conn, &LineCodec, &mut dispatcher, &mut out_rx).await;
    });

    relay.send("\nalice\nBOGUS");

    let frame = relay.recv().await.unwrap();
    let message = LineCodec.decode(&frame).expect("session wrote a valid frame");
    assert_eq!(message.kind, MessageKind::Error);
    assert_eq!(message.payload(), "Invalid type: BOGUS");
}
