//! `ChatClient`: the application-facing end of a relay connection.

use relaychat_protocol::{ConnectionState, LineCodec};
use relaychat_session::{ClientEvent, ClientSession, drive, outbox};
use relaychat_transport::{Connection, connect};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::RelayError;

/// A connection to a relay, registered (or registering) under a username.
///
/// The connection is served by a background task; what the relay sends
/// arrives on the event receiver returned by [`connect`](Self::connect).
pub struct ChatClient {
    session: ClientSession,
    task: JoinHandle<()>,
}

impl ChatClient {
    /// Connects to the relay at `host:port` and asks to register as
    /// `username` (blank lets the relay pick a placeholder name).
    ///
    /// Returns as soon as the CONNECT is queued; the outcome arrives as a
    /// `StateChanged(Connected)` event, or an ERROR message followed by
    /// `StateChanged(New)`, after which [`reconnect`](Self::reconnect)
    /// may try another name.
    ///
    /// # Errors
    /// Returns a transport error if the relay cannot be reached, or a
    /// session error if `username` cannot be sent (it contains a line
    /// break); the connection is dropped in that case.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
    ) -> Result<(ChatClient, UnboundedReceiver<ClientEvent>), RelayError> {
        let conn = connect(&format!("{host}:{port}")).await?;
        let (outbox_tx, mut outbox_rx) = outbox();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = ClientSession::new(username, outbox_tx, events_tx);

        let mut dispatcher = session.clone();
        let task = tokio::spawn(async move {
            drive(&conn, &LineCodec, &mut dispatcher, &mut outbox_rx).await;
            if conn.is_available() {
                let _ = conn.close().await;
            }
        });

        if let Err(e) = session.connect().await {
            task.abort();
            return Err(e.into());
        }
        Ok((ChatClient { session, task }, events_rx))
    }

    /// Retries registration after the relay refused the previous name.
    pub async fn reconnect(&self, username: &str) -> Result<(), RelayError> {
        self.session.rename(username).await?;
        self.session.connect().await?;
        Ok(())
    }

    /// Asks the relay to end the session.
    pub async fn disconnect(&self) -> Result<(), RelayError> {
        self.session.disconnect().await?;
        Ok(())
    }

    /// Sends `payload` to `receiver`; a blank receiver means everyone.
    pub async fn send_message(
        &self,
        receiver: &str,
        payload: &str,
    ) -> Result<(), RelayError> {
        self.session.send_message(receiver, payload).await?;
        Ok(())
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.state().await
    }

    pub async fn username(&self) -> String {
        self.session.username().await
    }

    /// Waits for the connection task to end, e.g. after a disconnect.
    pub async fn closed(self) {
        let _ = self.task.await;
    }

    /// Drops the connection without a DISCONNECT.
    pub fn close(self) {
        self.task.abort();
    }
}
