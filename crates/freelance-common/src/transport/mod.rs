//! Freelance Transport Layer
//!
//! This module provides the identity-routing transport the client runtime and
//! the reply server talk through.
//!
//! # Architecture
//!
//! - **Routing**: frame 0 of an outbound message names the peer to send to and
//!   is consumed by the transport; inbound messages get the sending peer's
//!   identity prepended as frame 0
//! - **Transport**: TCP, one connection per peer, redialed while unreachable
//! - **Wire Format**: `[u32 BE frame count] ([u32 BE length] [bytes])*`
//!
//! # Components
//!
//! - **[`Router`]**: the seam the client engine is written against
//! - **[`FrameCodec`]**: encode/decode multi-frame messages
//! - **[`TcpRouter`]**: TCP implementation, connecting (`new` + `connect`) and
//!   accepting (`bind`)
//!
//! # Message Size Limits
//!
//! Encoded messages are limited to 100 MB.

use std::future::Future;

use crate::protocol::error::Result;
use crate::protocol::Message;

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::{FrameCodec, MAX_MESSAGE_SIZE};
pub use tcp::{format_endpoint, parse_endpoint, TcpRouter, DEFAULT_RECONNECT_INTERVAL};

/// Addressable, message-oriented transport.
///
/// Peers are named by identity strings. Implementations must not block in
/// `connect` or `send`; the only suspension point is `recv`.
pub trait Router: Send {
    /// Starts connecting to `endpoint`. Returns immediately; messages sent to
    /// the endpoint before the link is up are queued. Connecting to an
    /// endpoint twice is a no-op.
    fn connect(&mut self, endpoint: &str) -> Result<()>;

    /// Routes `message` to the peer named by its frame 0, which is consumed.
    ///
    /// Failures are transient from the caller's point of view, except
    /// `TransportClosed`.
    fn send(&mut self, message: Message) -> Result<()>;

    /// Waits for the next inbound message, with the sending peer's identity
    /// as frame 0. `None` means the transport is shut down for good.
    ///
    /// Must be cancel safe: dropping the future before it completes loses no
    /// message.
    fn recv(&mut self) -> impl Future<Output = Option<Message>> + Send;
}

#[cfg(test)]
mod tests;
