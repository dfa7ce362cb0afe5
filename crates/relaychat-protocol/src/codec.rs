//! Codec trait and the line-based frame codec.
//!
//! A frame is the text form of one [`Message`]: four fields joined by
//! `\n`, in fixed order.
//!
//! ```text
//! alice        ← sender
//! bob          ← receiver
//! MESSAGE      ← kind
//! hi there     ← payload (optional, always last)
//! ```
//!
//! There is no length prefix and no escaping, so a field may never contain
//! a line break. [`LineCodec`] refuses to encode such a message and refuses
//! to decode a frame with extra lines, rather than silently cutting the
//! payload at its first line break.

use crate::{Field, Message, MessageKind, ProtocolError};

/// Converts messages to frames and back.
///
/// Sessions hold a codec instead of calling [`LineCodec`] directly, so a
/// different framing can be plugged in without touching the state machine.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message into one frame.
    ///
    /// # Errors
    /// Returns an error if the message cannot be represented in this
    /// framing.
    fn encode(&self, message: &Message) -> Result<String, ProtocolError>;

    /// Parses one frame.
    ///
    /// # Errors
    /// Returns an error if the frame is malformed. No partial message is
    /// ever produced.
    fn decode(&self, frame: &str) -> Result<Message, ProtocolError>;
}

/// The relay's wire codec: `\n`-separated fields.
///
/// Lines may also end in `\r\n`; the `\r` is stripped when decoding.
///
/// ```rust
/// use relaychat_protocol::{Codec, LineCodec, Message, MessageKind};
///
/// let codec = LineCodec;
/// let msg = Message::new("alice", "bob", MessageKind::Message, "hi");
///
/// let frame = codec.encode(&msg).unwrap();
/// assert_eq!(frame, "alice\nbob\nMESSAGE\nhi");
/// assert_eq!(codec.decode(&frame).unwrap(), msg);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl Codec for LineCodec {
    fn encode(&self, message: &Message) -> Result<String, ProtocolError> {
        message.validate()?;
        let mut frame = format!(
            "{}\n{}\n{}",
            message.sender, message.receiver, message.kind
        );
        if let Some(payload) = &message.payload {
            frame.push('\n');
            frame.push_str(payload);
        }
        Ok(frame)
    }

    fn decode(&self, frame: &str) -> Result<Message, ProtocolError> {
        if frame.is_empty() {
            return Err(ProtocolError::MissingField(Field::Sender));
        }
        let mut lines = frame
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line));

        let sender = lines
            .next()
            .ok_or(ProtocolError::MissingField(Field::Sender))?;
        let receiver = lines
            .next()
            .ok_or(ProtocolError::MissingField(Field::Receiver))?;
        let kind: MessageKind = lines
            .next()
            .ok_or(ProtocolError::MissingField(Field::Kind))?
            .parse()?;
        let payload = lines.next();

        let extra = lines.count();
        if extra > 0 {
            return Err(ProtocolError::TrailingLines(4 + extra));
        }

        Ok(Message {
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            kind,
            payload: payload.map(str::to_owned),
        })
    }
}
