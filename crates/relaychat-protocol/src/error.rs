//! Error types for the protocol layer.
//!
//! Every variant describes a frame that cannot be turned into a
//! [`Message`](crate::Message) (or a message that cannot be turned into a
//! frame). Decoding never yields a partial message: it is all or nothing.

use std::fmt;

/// A field of the line-based frame, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Sender,
    Receiver,
    Kind,
    Payload,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Sender => "sender",
            Field::Receiver => "receiver",
            Field::Kind => "kind",
            Field::Payload => "payload",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while encoding or decoding frames.
///
/// The display text of these errors is sent back verbatim as the payload
/// of an `ERROR` reply, so it is written for the remote user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// One of the three mandatory lines is missing.
    #[error("No {0} found")]
    MissingField(Field),

    /// The kind line is not one of the six kind names.
    #[error("Invalid type: {0}")]
    InvalidKind(String),

    /// A field contains a line break and cannot be framed.
    ///
    /// The frame format has no escaping, so the break would shift every
    /// following field.
    #[error("Line break not allowed in {0}")]
    LineBreak(Field),

    /// The frame has more lines than the four fields.
    ///
    /// Usually a payload that was split across lines by the sender.
    #[error("Frame has {0} lines, at most 4 allowed")]
    TrailingLines(usize),
}
