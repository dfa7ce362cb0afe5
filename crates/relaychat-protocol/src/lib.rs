//! Wire protocol for relaychat.
//!
//! This crate defines the "language" clients and the relay speak:
//!
//! - **Types** ([`Message`], [`MessageKind`], [`ConnectionState`]) and the
//!   fixed names and payload texts of the protocol.
//! - **Codec** ([`Codec`] trait, [`LineCodec`]): how a message becomes a
//!   text frame and back.
//! - **Errors** ([`ProtocolError`]): what can be wrong with a frame.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (text frames) and session
//! (connection state). It knows nothing about connections or the registry.
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Session (state machine)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, LineCodec};
pub use error::{Field, ProtocolError};
pub use types::{
    ANONYMOUS_PREFIX, ConnectionState, DEFAULT_PORT, Message, MessageKind,
    USER_ALL, USER_NONE, anonymous_name, disconnect_successful,
    registration_successful,
};
