//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with both a raw tokio-tungstenite client and the crate's own
//! [`connect`] helper.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use relaychat_transport::{
        Connection, Handshake, Transport, TransportError, WebSocketConnection,
        WebSocketTransport, connect,
    };
    use tokio_tungstenite::tungstenite::Message;

    async fn bind() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    async fn accept_one(transport: &mut WebSocketTransport) -> WebSocketConnection {
        let pending = transport.accept().await.expect("should accept");
        pending.complete().await.expect("handshake should complete")
    }

    async fn connect_raw(
        addr: &str,
    ) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind().await;

        let server_handle =
            tokio::spawn(async move { accept_one(&mut transport).await });
        let mut client_ws = connect_raw(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");

        // The first accepted connection is numbered 1.
        assert_eq!(server_conn.id().into_inner(), 1);
        assert!(server_conn.peer_addr().is_some());
        assert!(server_conn.is_available());

        server_conn
            .send("alice\nbob\nMESSAGE\nhi")
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "alice\nbob\nMESSAGE\nhi");

        client_ws
            .send(Message::text("bob\nalice\nMESSAGE\nhello".to_string()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have a frame");
        assert_eq!(received, "bob\nalice\nMESSAGE\nhello");

        server_conn.close().await.expect("close should succeed");
        assert!(!server_conn.is_available());
    }

    #[tokio::test]
    async fn test_websocket_binary_frames_are_read_as_text() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { accept_one(&mut transport).await });
        let mut client_ws = connect_raw(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws
            .send(Message::Binary(b"a\nb\nINFO".to_vec().into()))
            .await
            .unwrap();

        let frame = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(frame, "a\nb\nINFO");
    }

    #[tokio::test]
    async fn test_websocket_binary_frame_invalid_utf8_is_receive_error() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { accept_one(&mut transport).await });
        let mut client_ws = connect_raw(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws
            .send(Message::Binary(vec![b'a', b'\n', 0xff, 0xfe].into()))
            .await
            .unwrap();

        let result = server_conn.recv().await;
        match result {
            Err(TransportError::ReceiveFailed(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::InvalidData);
            }
            other => panic!("expected a receive error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { accept_one(&mut transport).await });
        let mut client_ws = connect_raw(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
        assert!(!server_conn.is_available());
    }

    #[tokio::test]
    async fn test_websocket_connection_ids_increase_per_transport() {
        let (mut transport, addr) = bind().await;
        let accept = tokio::spawn(async move {
            let a = transport.accept().await.unwrap();
            let b = transport.accept().await.unwrap();
            (a.id().into_inner(), b.id().into_inner())
        });
        // Plain TCP is enough: numbering happens before the handshake.
        let _c1 = tokio::net::TcpStream::connect(&addr).await.unwrap();
        let _c2 = tokio::net::TcpStream::connect(&addr).await.unwrap();

        let (a, b) = accept.await.unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn test_accept_returns_before_peer_sends_handshake() {
        let (mut transport, addr) = bind().await;
        let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();

        let pending = tokio::time::timeout(Duration::from_secs(2), transport.accept())
            .await
            .expect("accept must not wait for the handshake")
            .unwrap();

        assert_eq!(pending.id().into_inner(), 1);
        assert!(transport.is_available());
    }

    #[tokio::test]
    async fn test_handshake_complete_silent_peer_times_out() {
        let (transport, addr) = bind().await;
        let mut transport =
            transport.with_handshake_timeout(Duration::from_millis(100));
        let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
        let pending = transport.accept().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), pending.complete())
            .await
            .expect("handshake should give up on its own");

        match result {
            Err(TransportError::HandshakeFailed(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::TimedOut);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("silent peer must not complete a handshake"),
        }
    }

    #[tokio::test]
    async fn test_handshake_complete_garbage_request_fails() {
        use tokio::io::AsyncWriteExt;

        let (mut transport, addr) = bind().await;
        let mut peer = tokio::net::TcpStream::connect(&addr).await.unwrap();
        peer.write_all(b"hello there\r\n\r\n").await.unwrap();
        let pending = transport.accept().await.unwrap();

        let result = pending.complete().await;

        assert!(matches!(result, Err(TransportError::HandshakeFailed(_))));
    }

    #[tokio::test]
    async fn test_client_connect_round_trip() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { accept_one(&mut transport).await });
        let client = connect(&addr).await.expect("should connect");
        let server_conn = server_handle.await.unwrap();

        client.send("x\n\nCONNECT").await.unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), "x\n\nCONNECT");

        server_conn.send("\nx\nCONFIRM\nok").await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), "\nx\nCONFIRM\nok");
    }

    #[tokio::test]
    async fn test_client_connect_to_closed_port_fails() {
        let (transport, addr) = bind().await;
        drop(transport);

        let result = connect(&addr).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_pending_accept() {
        let (mut transport, _addr) = bind().await;
        let handle = transport.shutdown_handle();
        assert!(transport.is_available());

        let accept = tokio::spawn(async move {
            let result = transport.accept().await;
            (result.map(|_| ()), transport.is_available())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();

        let (result, available) =
            tokio::time::timeout(Duration::from_secs(2), accept)
                .await
                .expect("accept should return after shutdown")
                .unwrap();
        assert!(matches!(result, Err(TransportError::Shutdown)));
        assert!(!available);
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { accept_one(&mut transport).await });
        let _client_ws = connect_raw(&addr).await;
        let server_conn = server_handle.await.unwrap();

        server_conn.close().await.unwrap();
        let result = server_conn.send("late").await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }
}
