//! The registry: which username belongs to which live connection.
//!
//! Every server session shares one [`Registry`]. A username is present
//! exactly while some session is `CONNECTED` under it, so the registry is
//! also the routing table for unicast and broadcast delivery.
//!
//! # Concurrency note
//!
//! All operations go through a single `tokio::sync::Mutex`. Routing
//! (`unicast`, `broadcast`) delivers while still holding the lock, so a
//! delivery can never race a registration or removal: a broadcast sees
//! exactly the sessions registered at one instant, and a session that has
//! been unregistered receives nothing routed after that point. Delivery
//! itself is a non-blocking push onto the target's outbox, which keeps the
//! critical section short.
//!
//! Outboxes are bounded at [`OUTBOX_CAPACITY`]. A peer that stops reading
//! fills its outbox and from then on loses what is routed to it (logged
//! at `warn`); the sender and every other session carry on unaffected.

use std::collections::HashMap;

use relaychat_protocol::Message;
use relaychat_transport::ConnectionId;
use tokio::sync::{Mutex, mpsc};

use crate::SessionError;

/// A session's outbound queue. Whatever is pushed here is encoded and
/// written to the session's transport by the session's own task.
pub type Outbox = mpsc::Sender<Message>;

/// Messages a session may have queued but not yet written.
pub const OUTBOX_CAPACITY: usize = 256;

/// Creates an outbox and its receiving end with [`OUTBOX_CAPACITY`].
pub fn outbox() -> (Outbox, mpsc::Receiver<Message>) {
    mpsc::channel(OUTBOX_CAPACITY)
}

/// How the registry reaches a session: its connection id and its outbox.
///
/// Cheap to clone; cloning does not keep the session alive.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    outbox: Outbox,
}

impl SessionHandle {
    pub fn new(id: ConnectionId, outbox: Outbox) -> Self {
        Self { id, outbox }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a message for the session.
    ///
    /// Never waits. Returns `false` if the session has already ended or
    /// its outbox is full; the message is dropped (delivery is at most
    /// once).
    pub fn deliver(&self, message: Message) -> bool {
        match self.outbox.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    %message,
                    "outbox full, message dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    %message,
                    "session gone, message dropped"
                );
                false
            }
        }
    }
}

/// Shared directory of registered users.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `username`.
    ///
    /// The check and the insert happen under one lock, so of several
    /// concurrent registrations of the same name exactly one succeeds.
    ///
    /// # Errors
    /// Returns [`SessionError::UsernameTaken`] if the name is in use.
    pub async fn register(
        &self,
        username: &str,
        handle: SessionHandle,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(username) {
            return Err(SessionError::UsernameTaken(username.to_owned()));
        }
        tracing::debug!(conn_id = %handle.id, username, "registered");
        sessions.insert(username.to_owned(), handle);
        Ok(())
    }

    /// Removes `username`, returning the handle it was registered with.
    pub async fn unregister(&self, username: &str) -> Option<SessionHandle> {
        let removed = self.sessions.lock().await.remove(username);
        if let Some(handle) = &removed {
            tracing::debug!(conn_id = %handle.id, username, "unregistered");
        }
        removed
    }

    /// Returns the handle registered under `username`, if any.
    pub async fn lookup(&self, username: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(username).cloned()
    }

    /// Whether `username` is currently registered.
    pub async fn contains(&self, username: &str) -> bool {
        self.sessions.lock().await.contains_key(username)
    }

    /// Delivers `message` to the session registered under its receiver.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownReceiver`] if nobody is registered
    /// under that name.
    pub async fn unicast(&self, message: Message) -> Result<(), SessionError> {
        let sessions = self.sessions.lock().await;
        match sessions.get(&message.receiver) {
            Some(handle) => {
                handle.deliver(message);
                Ok(())
            }
            None => Err(SessionError::UnknownReceiver(message.receiver)),
        }
    }

    /// Delivers a copy of `message` to every registered session.
    ///
    /// Returns the number of sessions the message was queued for.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .filter(|handle| handle.deliver(message.clone()))
            .count()
    }

    /// Registered usernames, in no particular order.
    pub async fn usernames(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
