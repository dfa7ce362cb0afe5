//! Connection sessions and routing for relaychat.
//!
//! This crate holds everything that happens between "a frame arrived" and
//! "a frame goes out":
//!
//! 1. **Receive loop**: [`drive`] reads frames, decodes them and
//!    dispatches by kind to a [`Dispatcher`]
//! 2. **State machines**: [`ServerSession`] (the relay's view of a
//!    client) and [`ClientSession`] (the client's view of the relay)
//! 3. **Routing**: the shared [`Registry`] of usernames, with unicast
//!    and broadcast delivery
//!
//! # How it fits in the stack
//!
//! ```text
//! Relay (above)  ← accepts connections, spawns one session task each
//!     ↕
//! Session Layer (this crate)  ← connection state, registry, routing
//!     ↕
//! Protocol / Transport (below)  ← Message + codec, text-frame connections
//! ```

mod client;
mod dispatch;
mod error;
mod registry;
mod server;

pub use client::{ClientEvent, ClientSession};
pub use dispatch::{Dispatcher, Flow, drive};
pub use error::SessionError;
pub use registry::{OUTBOX_CAPACITY, Outbox, Registry, SessionHandle, outbox};
pub use server::ServerSession;
