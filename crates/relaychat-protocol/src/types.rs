//! Core protocol types for relaychat's wire format.
//!
//! Everything here travels between a client and the relay: the
//! [`Message`] record, the [`MessageKind`] that says what a message means,
//! and the [`ConnectionState`] both ends track while the conversation
//! progresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Field, ProtocolError};

// ---------------------------------------------------------------------------
// Fixed names and payload texts
// ---------------------------------------------------------------------------

/// Sender (or receiver) of messages that are not addressed to a user,
/// such as replies originated by the relay itself.
pub const USER_NONE: &str = "";

/// Receiver sentinel meaning "every registered user".
pub const USER_ALL: &str = "*";

/// Prefix of the placeholder username a connection carries before it
/// registers. The connection id is appended: `Anonymous-3`.
pub const ANONYMOUS_PREFIX: &str = "Anonymous-";

/// Port the relay listens on when none is given.
pub const DEFAULT_PORT: u16 = 22243;

/// Payload of a CONFIRM reply to a successful CONNECT.
pub fn registration_successful(username: &str) -> String {
    format!("Registration successful for {username}")
}

/// Payload of the DISCONNECT reply sent before the relay closes a session.
pub fn disconnect_successful(username: &str) -> String {
    format!("User {username} has successfully disconnected")
}

/// Builds the placeholder username for a connection number.
pub fn anonymous_name(id: u64) -> String {
    format!("{ANONYMOUS_PREFIX}{id}")
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// What a message means.
///
/// On the wire the kind is its upper-case name, matched case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Informational text for the user. Never routed by the relay.
    Info,
    /// Client → relay: register under the username in `sender`.
    Connect,
    /// Relay → client: the previous request succeeded.
    Confirm,
    /// Either direction: end the session.
    Disconnect,
    /// A chat message for `receiver` (or everyone, with [`USER_ALL`]).
    Message,
    /// Something went wrong; the payload says what.
    Error,
}

impl MessageKind {
    /// All kinds, in declaration order.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::Info,
        MessageKind::Connect,
        MessageKind::Confirm,
        MessageKind::Disconnect,
        MessageKind::Message,
        MessageKind::Error,
    ];

    /// The wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Info => "INFO",
            MessageKind::Connect => "CONNECT",
            MessageKind::Confirm => "CONFIRM",
            MessageKind::Disconnect => "DISCONNECT",
            MessageKind::Message => "MESSAGE",
            MessageKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidKind(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where a connection is in its lifecycle.
///
/// ```text
///  NEW ──CONNECT──→ CONFIRM_CONNECT ──CONFIRM──→ CONNECTED
///   ↑                     │                         │
///   └──────ERROR──────────┘                    DISCONNECT
///                                                   ↓
///                 DISCONNECTED ←──DISCONNECT── CONFIRM_DISCONNECT
/// ```
///
/// Relay-side sessions only ever occupy `New`, `Connected` and
/// `Disconnected`; the two `Confirm*` states belong to the client while it
/// waits for the relay's answer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    New,
    ConfirmConnect,
    Connected,
    ConfirmDisconnect,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "NEW",
            ConnectionState::ConfirmConnect => "CONFIRM_CONNECT",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::ConfirmDisconnect => "CONFIRM_DISCONNECT",
            ConnectionState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One protocol message. Every frame on the wire decodes to exactly one.
///
/// `payload` is `None` when the frame has no fourth line, which is
/// different from `Some("")` (an empty fourth line).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub receiver: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Message {
    /// Creates a message with a payload.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        kind: MessageKind,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            kind,
            payload: Some(payload.into()),
        }
    }

    /// Creates a message whose frame has no payload line.
    pub fn bare(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            kind,
            payload: None,
        }
    }

    /// An `ERROR` from the relay to `receiver`.
    pub fn error(receiver: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(USER_NONE, receiver, MessageKind::Error, text)
    }

    /// The `CONFIRM` the relay sends after registering `username`.
    pub fn registration_confirm(username: &str) -> Self {
        Self::new(
            USER_NONE,
            username,
            MessageKind::Confirm,
            registration_successful(username),
        )
    }

    /// The `DISCONNECT` the relay sends back before closing a session.
    pub fn disconnect_confirm(username: &str) -> Self {
        Self::new(
            username,
            USER_NONE,
            MessageKind::Disconnect,
            disconnect_successful(username),
        )
    }

    /// The payload text, or `""` when absent.
    pub fn payload(&self) -> &str {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Whether this message is addressed to every registered user.
    pub fn is_broadcast(&self) -> bool {
        self.receiver == USER_ALL
    }

    /// Checks that every field fits on a single line.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let fields = [
            (Field::Sender, self.sender.as_str()),
            (Field::Receiver, self.receiver.as_str()),
            (Field::Payload, self.payload()),
        ];
        for (field, value) in fields {
            if value.contains(['\n', '\r']) {
                return Err(ProtocolError::LineBreak(field));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Message {
    /// Human-readable one-liner used in logs, e.g. `MESSAGE alice -> bob: hi`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.kind, self.sender, self.receiver)?;
        if let Some(payload) = &self.payload {
            write!(f, ": {payload}")?;
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
